//! Error taxonomy for the detection core.
//!
//! Every failure the core can report is a `DetectError`. Listeners receive the
//! fieldless `ErrorKind` plus a rendered message, so presentation code can
//! branch on the kind without matching on payloads.

use thiserror::Error;

use crate::detect::RunningMode;

pub type DetectResult<T> = std::result::Result<T, DetectError>;

#[derive(Debug, Error)]
pub enum DetectError {
    /// A single frame (or a whole batch) could not be processed. Recoverable.
    #[error("inference failed: {0}")]
    InferenceFailure(String),

    /// A detect method was called after the engine handle was released.
    #[error("detector engine is closed")]
    EngineClosed,

    /// Geometry input with a zero, negative or non-finite frame size.
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidFrameDimensions { width: f64, height: f64 },

    /// The exclusive camera is already bound to another pipeline.
    #[error("camera already bound to pipeline #{holder}; unbind it first")]
    ResourceBindingConflict { holder: u64 },

    /// The engine could not be constructed or warmed up.
    #[error("detector engine failed to initialize: {0}")]
    EngineInit(String),

    #[error("detector created for {actual:?} mode cannot run {expected:?} detection")]
    WrongRunningMode {
        expected: RunningMode,
        actual: RunningMode,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DetectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InferenceFailure(_) => ErrorKind::InferenceFailure,
            Self::EngineClosed => ErrorKind::EngineClosed,
            Self::InvalidFrameDimensions { .. } => ErrorKind::InvalidFrameDimensions,
            Self::ResourceBindingConflict { .. } => ErrorKind::ResourceBindingConflict,
            Self::EngineInit(_) => ErrorKind::EngineInit,
            Self::WrongRunningMode { .. } => ErrorKind::WrongRunningMode,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    pub(crate) fn invalid_dimensions(width: impl Into<f64>, height: impl Into<f64>) -> Self {
        Self::InvalidFrameDimensions {
            width: width.into(),
            height: height.into(),
        }
    }

    /// Whether the pipeline should keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InferenceFailure(_) | Self::EngineClosed)
    }
}

/// Fieldless mirror of `DetectError`, handed to error listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InferenceFailure,
    EngineClosed,
    InvalidFrameDimensions,
    ResourceBindingConflict,
    EngineInit,
    WrongRunningMode,
    InvalidConfig,
}
