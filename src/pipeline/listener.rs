use std::sync::Arc;

use crate::detect::DetectionResult;
use crate::error::{DetectError, ErrorKind};

use super::token::CancellationToken;

/// Receives pipeline output. Called from worker threads.
pub trait ResultListener: Send + Sync {
    fn on_result(&self, result: &DetectionResult);

    fn on_error(&self, kind: ErrorKind, message: &str) {
        log::warn!("unhandled {:?} error: {}", kind, message);
    }
}

pub type ResultCallback = Arc<dyn Fn(&DetectionResult) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(ErrorKind, &str) + Send + Sync>;

/// Listener assembled from optional closures. Missing callbacks drop events.
#[derive(Clone, Default)]
pub struct CallbackListener {
    on_result: Option<ResultCallback>,
    on_error: Option<ErrorCallback>,
}

impl CallbackListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result<F>(mut self, f: F) -> Self
    where
        F: Fn(&DetectionResult) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(f));
        self
    }

    pub fn with_error<F>(mut self, f: F) -> Self
    where
        F: Fn(ErrorKind, &str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn from_parts(
        on_result: Option<ResultCallback>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            on_result,
            on_error,
        }
    }
}

impl ResultListener for CallbackListener {
    fn on_result(&self, result: &DetectionResult) {
        if let Some(f) = &self.on_result {
            f(result);
        }
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        if let Some(f) = &self.on_error {
            f(kind, message);
        }
    }
}

/// Liveness-gated route from a worker to its listener.
#[derive(Clone)]
pub(crate) struct Outlet {
    token: CancellationToken,
    listener: Arc<dyn ResultListener>,
}

impl Outlet {
    pub(crate) fn new(token: CancellationToken, listener: Arc<dyn ResultListener>) -> Self {
        Self { token, listener }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns false when the pipeline was already disposed and the result discarded.
    pub(crate) fn result(&self, result: &DetectionResult) -> bool {
        self.token.deliver(|| self.listener.on_result(result))
    }

    pub(crate) fn error(&self, err: &DetectError) -> bool {
        let message = err.to_string();
        self.token
            .deliver(|| self.listener.on_error(err.kind(), &message))
    }
}
