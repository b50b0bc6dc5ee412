//! demo - drive the detection pipeline against synthetic sources
//!
//! Runs one of the three strategies end to end and prints every delivered
//! result as a JSON line of display-space overlay items:
//! - `live`: synthetic `stub://` camera until Ctrl-C or `--seconds` elapse
//! - `image`: one still image (a file with `--image`, otherwise synthetic)
//! - `video`: synthetic clip, batch detection, then timed replay

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::mpsc;
use std::time::Duration;

use live_detect::{
    fitted_viewport, map_result, AppConfig, DecodedVideo, DetectionResult, DetectionSession,
    ExecutionBackend, Frame, FrameSource, LiveStream, LiveStreamConfig, StillImage,
    SyntheticVideo, Viewport,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Live,
    Image,
    Video,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Which frame source to run.
    #[arg(long, value_enum, default_value_t = Mode::Live)]
    mode: Mode,
    /// Stop a live run after this many seconds (0 = until Ctrl-C).
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Override the confidence threshold.
    #[arg(long, env = "LIVE_DETECT_THRESHOLD")]
    threshold: Option<f32>,
    /// Override the execution backend (cpu or gpu).
    #[arg(long, env = "LIVE_DETECT_BACKEND")]
    backend: Option<ExecutionBackend>,
    /// Image file for `--mode image`.
    #[arg(long)]
    image: Option<std::path::PathBuf>,
    /// Length of the synthetic clip for `--mode video`.
    #[arg(long, default_value_t = 3000)]
    video_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut app = AppConfig::load()?;
    if let Some(threshold) = args.threshold {
        app.pipeline.confidence_threshold = threshold;
    }
    if let Some(backend) = args.backend {
        app.pipeline.execution_backend = backend;
    }

    let mut session = DetectionSession::from_app_config(&app)?;
    let viewport = match args.mode {
        Mode::Video => fitted_viewport(
            app.viewport.width,
            live_detect::FrameDimensions::new(app.camera.width, app.camera.height)?,
        )?,
        _ => Viewport::from(&app.viewport),
    };
    session.on_result(move |result| print_result(result, viewport));
    session.on_error(|kind, message| log::warn!("demo: {:?}: {}", kind, message));

    match args.mode {
        Mode::Live => {
            let stream = LiveStream::new(LiveStreamConfig::from(&app.camera))?;
            session.start(FrameSource::LiveStream(stream))?;

            let (tx, rx) = mpsc::channel();
            ctrlc::set_handler(move || {
                let _ = tx.send(());
            })
            .expect("error setting Ctrl-C handler");

            if args.seconds == 0 {
                log::info!("demo: streaming until Ctrl-C...");
                let _ = rx.recv();
            } else {
                let _ = rx.recv_timeout(Duration::from_secs(args.seconds));
            }
            session.stop();
        }
        Mode::Image => {
            let image = match &args.image {
                Some(path) => open_image(path)?,
                None => StillImage::from_frame(synthetic_still(&app)?),
            };
            session.start(FrameSource::StillImage(image))?;
            session.wait();
            session.stop();
        }
        Mode::Video => {
            let mut decoder = SyntheticVideo::open(
                "stub://demo_clip",
                args.video_ms,
                app.camera.width,
                app.camera.height,
            )?;
            let video = DecodedVideo::sample(&mut decoder, app.replay.sample_interval_ms)?;
            session.start(FrameSource::DecodedVideo(video))?;
            session.wait();
            session.stop();
        }
    }

    match session.last_inference_time_ms() {
        Some(ms) => log::info!("demo: last inference took {}ms", ms),
        None => log::info!("demo: no results delivered"),
    }
    Ok(())
}

fn print_result(result: &DetectionResult, viewport: Viewport) {
    match map_result(result, viewport) {
        Ok(items) => {
            let line = serde_json::json!({
                "sequence": result.sequence,
                "timestamp_ms": result.timestamp_ms,
                "inference_time_ms": result.inference_time_ms,
                "items": items,
            });
            println!("{}", line);
        }
        Err(err) => log::warn!("demo: cannot map result #{}: {}", result.sequence, err),
    }
}

#[cfg(feature = "decode-image")]
fn open_image(path: &std::path::Path) -> Result<StillImage> {
    StillImage::open(path).with_context(|| format!("failed to load {}", path.display()))
}

#[cfg(not(feature = "decode-image"))]
fn open_image(path: &std::path::Path) -> Result<StillImage> {
    Err(anyhow!(
        "cannot open {}: built without the decode-image feature",
        path.display()
    ))
}

/// A table with a few pieces of produce on it.
fn synthetic_still(app: &AppConfig) -> Result<Frame> {
    let (width, height) = (app.camera.width, app.camera.height);
    if width < 16 || height < 16 {
        return Err(anyhow!("camera frame {}x{} too small for the demo", width, height));
    }
    let mut frame = Frame::filled(width, height, [120, 100, 80, 255])
        .context("invalid camera dimensions")?;
    let cell = (width / 8).max(1);
    frame.fill_rect(cell, cell, cell * 2, cell * 2, [220, 30, 30, 255]);
    frame.fill_rect(cell * 4, cell * 3, cell * 3, cell, [240, 210, 30, 255]);
    frame.fill_rect(cell * 2, cell * 6, cell * 2, cell * 2, [50, 180, 60, 255]);
    Ok(frame)
}
