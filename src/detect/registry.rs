use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::config::{ExecutionBackend, PipelineConfig};
use crate::error::{DetectError, DetectResult};

use super::backend::DetectorBackend;
use super::backends::CpuBackend;

type BackendFactory =
    Arc<dyn Fn(&PipelineConfig) -> Result<Box<dyn DetectorBackend>> + Send + Sync>;

/// Thread-safe registry of engine constructors, keyed by execution backend.
///
/// A pipeline asks the registry for a fresh engine every time it is created,
/// so a config change always yields a new engine instance.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<ExecutionBackend, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// CPU colour-region engine, plus the ONNX engine in the GPU slot when built
    /// with `backend-tract`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ExecutionBackend::Cpu, |config| {
            Ok(Box::new(CpuBackend::new(config)) as Box<dyn DetectorBackend>)
        });
        #[cfg(feature = "backend-tract")]
        registry.register(ExecutionBackend::Gpu, |config| {
            Ok(Box::new(super::backends::TractBackend::new(config)?) as Box<dyn DetectorBackend>)
        });
        registry
    }

    /// Register (or replace) the constructor for an execution backend.
    pub fn register<F>(&mut self, backend: ExecutionBackend, factory: F)
    where
        F: Fn(&PipelineConfig) -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(backend, Arc::new(factory));
    }

    pub fn supports(&self, backend: ExecutionBackend) -> bool {
        self.factories.contains_key(&backend)
    }

    /// List registered execution backends.
    pub fn list(&self) -> Vec<ExecutionBackend> {
        self.factories.keys().copied().collect()
    }

    /// Construct a new engine for `config`.
    pub fn create(&self, config: &PipelineConfig) -> DetectResult<Box<dyn DetectorBackend>> {
        let factory = self
            .factories
            .get(&config.execution_backend)
            .ok_or_else(|| {
                DetectError::EngineInit(format!(
                    "no engine registered for {:?} execution",
                    config.execution_backend
                ))
            })?;
        factory(config).map_err(|e| DetectError::EngineInit(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use anyhow::anyhow;

    #[test]
    fn defaults_provide_cpu() {
        let registry = BackendRegistry::with_defaults();
        assert!(registry.supports(ExecutionBackend::Cpu));
        let backend = registry.create(&PipelineConfig::default()).unwrap();
        assert_eq!(backend.name(), "cpu");
    }

    #[test]
    fn missing_backend_is_engine_init() {
        let registry = BackendRegistry::new();
        let config = PipelineConfig {
            execution_backend: ExecutionBackend::Gpu,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            registry.create(&config).err(),
            Some(DetectError::EngineInit(_))
        ));
    }

    #[test]
    fn factory_errors_become_engine_init() {
        let mut registry = BackendRegistry::new();
        registry.register(ExecutionBackend::Gpu, |_| Err(anyhow!("delegate unavailable")));
        registry.register(ExecutionBackend::Cpu, |_| {
            Ok(Box::new(StubBackend::new()) as Box<dyn DetectorBackend>)
        });
        let config = PipelineConfig {
            execution_backend: ExecutionBackend::Gpu,
            ..PipelineConfig::default()
        };
        let err = registry.create(&config).err().unwrap();
        assert!(err.to_string().contains("delegate unavailable"));
        assert_eq!(registry.create(&PipelineConfig::default()).unwrap().name(), "stub");
    }
}
