mod backend;
pub mod backends;
mod detector;
mod registry;
mod result;

pub use backend::{DetectorBackend, RunningMode};
pub use backends::{CpuBackend, StubBackend};
pub use detector::Detector;
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection, DetectionBatch, DetectionResult};
