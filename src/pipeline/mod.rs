//! Execution strategies, one per frame source.
//!
//! - `StreamingPipeline`: live camera, single worker, keep-latest frames
//! - `StillImageJob`: one detection on a background worker
//! - `ReplayHandle`: batch detection over a decoded video, replayed on a timer
//!
//! Every path delivers through a `CancellationToken`, so nothing reaches a
//! listener after its owner has stopped the job.

mod listener;
pub mod replay;
mod still;
mod streaming;
mod token;

pub use listener::{CallbackListener, ErrorCallback, ResultCallback, ResultListener};
pub use replay::{result_index, ReplayCursor, ReplayHandle, ReplayTick};
pub use still::StillImageJob;
pub use streaming::{PipelineState, PipelineStats, StreamingPipeline};
pub use token::CancellationToken;
