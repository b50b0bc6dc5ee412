use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{DetectError, DetectResult};

const DEFAULT_THRESHOLD: f32 = 0.4;
const DEFAULT_MAX_RESULTS: usize = 5;
const DEFAULT_CAMERA_URI: &str = "stub://back_camera";
const DEFAULT_CAMERA_FPS: u32 = 15;
const DEFAULT_CAMERA_WIDTH: u32 = 480;
const DEFAULT_CAMERA_HEIGHT: u32 = 640;
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 300;
const DEFAULT_VIEWPORT_WIDTH: f32 = 340.0;
const DEFAULT_VIEWPORT_HEIGHT: f32 = 453.0;
const DEFAULT_MODEL_DIR: &str = "models";

// ----------------------------------------------------------------------------
// PipelineConfig
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    #[default]
    Cpu,
    Gpu,
}

impl FromStr for ExecutionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(anyhow!("unknown execution backend '{}'", other)),
        }
    }
}

/// Serialized as `efficientdet_lite0` / `efficientdet_lite2`; config files
/// accept the same spellings as `FromStr`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    #[default]
    #[serde(
        rename = "efficientdet_lite0",
        alias = "efficient_det_lite0",
        alias = "efficientdet-lite0",
        alias = "lite0"
    )]
    EfficientDetLite0,
    #[serde(
        rename = "efficientdet_lite2",
        alias = "efficient_det_lite2",
        alias = "efficientdet-lite2",
        alias = "lite2"
    )]
    EfficientDetLite2,
}

impl ModelVariant {
    /// Model file stem, shared by every backend that loads weights from disk.
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::EfficientDetLite0 => "efficientdet-lite0",
            Self::EfficientDetLite2 => "efficientdet-lite2",
        }
    }
}

impl FromStr for ModelVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "efficientdet_lite0" | "efficient_det_lite0" | "efficientdet-lite0" | "lite0" => {
                Ok(Self::EfficientDetLite0)
            }
            "efficientdet_lite2" | "efficient_det_lite2" | "efficientdet-lite2" | "lite2" => {
                Ok(Self::EfficientDetLite2)
            }
            other => Err(anyhow!("unknown model variant '{}'", other)),
        }
    }
}

/// Detector settings. Fixed for the lifetime of a pipeline; a change means a
/// new pipeline with a new detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub confidence_threshold: f32,
    pub max_results: usize,
    pub execution_backend: ExecutionBackend,
    pub model_variant: ModelVariant,
    /// Directory holding model files for backends that load weights.
    pub model_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            execution_backend: ExecutionBackend::default(),
            model_variant: ModelVariant::default(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> DetectResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectError::InvalidConfig(format!(
                "confidence threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.max_results == 0 {
            return Err(DetectError::InvalidConfig(
                "max results per frame must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn model_path(&self, extension: &str) -> PathBuf {
        self.model_dir
            .join(format!("{}.{}", self.model_variant.file_stem(), extension))
    }
}

// ----------------------------------------------------------------------------
// AppConfig: file + environment
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    pipeline: Option<PipelineConfigFile>,
    camera: Option<CameraConfigFile>,
    replay: Option<ReplayConfigFile>,
    viewport: Option<ViewportConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    confidence_threshold: Option<f32>,
    max_results: Option<usize>,
    execution_backend: Option<ExecutionBackend>,
    model_variant: Option<ModelVariant>,
    model_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ReplayConfigFile {
    sample_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ViewportConfigFile {
    width: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub camera: CameraSettings,
    pub replay: ReplaySettings,
    pub viewport: ViewportSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub uri: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySettings {
    pub sample_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSettings {
    pub width: f32,
    pub height: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_CAMERA_URI.to_string(),
            target_fps: DEFAULT_CAMERA_FPS,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            camera: CameraSettings::default(),
            replay: ReplaySettings {
                sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            },
            viewport: ViewportSettings {
                width: DEFAULT_VIEWPORT_WIDTH,
                height: DEFAULT_VIEWPORT_HEIGHT,
            },
        }
    }
}

impl AppConfig {
    /// Load from `LIVE_DETECT_CONFIG` (JSON, or TOML by extension), then apply
    /// `LIVE_DETECT_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let defaults = Self::default();
        let pipeline = file.pipeline.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let replay = file.replay.unwrap_or_default();
        let viewport = file.viewport.unwrap_or_default();
        Self {
            pipeline: PipelineConfig {
                confidence_threshold: pipeline
                    .confidence_threshold
                    .unwrap_or(defaults.pipeline.confidence_threshold),
                max_results: pipeline
                    .max_results
                    .unwrap_or(defaults.pipeline.max_results),
                execution_backend: pipeline
                    .execution_backend
                    .unwrap_or(defaults.pipeline.execution_backend),
                model_variant: pipeline
                    .model_variant
                    .unwrap_or(defaults.pipeline.model_variant),
                model_dir: pipeline.model_dir.unwrap_or(defaults.pipeline.model_dir),
            },
            camera: CameraSettings {
                uri: camera.uri.unwrap_or(defaults.camera.uri),
                target_fps: camera.target_fps.unwrap_or(defaults.camera.target_fps),
                width: camera.width.unwrap_or(defaults.camera.width),
                height: camera.height.unwrap_or(defaults.camera.height),
            },
            replay: ReplaySettings {
                sample_interval_ms: replay
                    .sample_interval_ms
                    .unwrap_or(defaults.replay.sample_interval_ms),
            },
            viewport: ViewportSettings {
                width: viewport.width.unwrap_or(defaults.viewport.width),
                height: viewport.height.unwrap_or(defaults.viewport.height),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(threshold) = std::env::var("LIVE_DETECT_THRESHOLD") {
            self.pipeline.confidence_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_THRESHOLD must be a number in [0, 1]"))?;
        }
        if let Ok(max_results) = std::env::var("LIVE_DETECT_MAX_RESULTS") {
            self.pipeline.max_results = max_results
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_MAX_RESULTS must be a positive integer"))?;
        }
        if let Ok(backend) = std::env::var("LIVE_DETECT_BACKEND") {
            if !backend.trim().is_empty() {
                self.pipeline.execution_backend = backend.parse()?;
            }
        }
        if let Ok(model) = std::env::var("LIVE_DETECT_MODEL") {
            if !model.trim().is_empty() {
                self.pipeline.model_variant = model.parse()?;
            }
        }
        if let Ok(uri) = std::env::var("LIVE_DETECT_SOURCE") {
            if !uri.trim().is_empty() {
                self.camera.uri = uri;
            }
        }
        if let Ok(interval) = std::env::var("LIVE_DETECT_SAMPLE_INTERVAL_MS") {
            self.replay.sample_interval_ms = interval.trim().parse().map_err(|_| {
                anyhow!("LIVE_DETECT_SAMPLE_INTERVAL_MS must be an integer number of milliseconds")
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be >= 1"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be non-zero"));
        }
        if self.replay.sample_interval_ms == 0 {
            return Err(anyhow!("replay sample_interval_ms must be greater than zero"));
        }
        if !(self.viewport.width > 0.0 && self.viewport.height > 0.0) {
            return Err(anyhow!("viewport width and height must be positive"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
