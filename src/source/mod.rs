//! Frame sources.
//!
//! Three producers feed the detector:
//! - `LiveStream`: camera frames at sensor rate, handed over through a
//!   keep-latest `FrameSlot` while bound to the exclusive `CameraProvider`
//! - `StillImage`: exactly one decoded frame
//! - `DecodedVideo`: a finite frame sequence sampled at a fixed interval
//!
//! `FrameSource` is the tagged union a session dispatches on.

pub mod camera;
pub mod live;
mod normalize;
pub mod slot;
pub mod still;
pub mod video;

pub use camera::{CameraBinding, CameraProvider};
pub use live::{FramePusher, LiveStream, LiveStreamConfig};
pub use normalize::PixelFormat;
pub use slot::{frame_slot, SlotReceiver, SlotSender, SlotStats};
pub use still::StillImage;
pub use video::{DecodedVideo, SyntheticVideo, VideoDecoder};

pub enum FrameSource {
    LiveStream(LiveStream),
    StillImage(StillImage),
    DecodedVideo(DecodedVideo),
}

impl FrameSource {
    pub fn kind(&self) -> &'static str {
        match self {
            FrameSource::LiveStream(_) => "live_stream",
            FrameSource::StillImage(_) => "still_image",
            FrameSource::DecodedVideo(_) => "decoded_video",
        }
    }
}

impl From<LiveStream> for FrameSource {
    fn from(stream: LiveStream) -> Self {
        FrameSource::LiveStream(stream)
    }
}

impl From<StillImage> for FrameSource {
    fn from(image: StillImage) -> Self {
        FrameSource::StillImage(image)
    }
}

impl From<DecodedVideo> for FrameSource {
    fn from(video: DecodedVideo) -> Self {
        FrameSource::DecodedVideo(video)
    }
}
