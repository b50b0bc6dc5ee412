use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use live_detect::detect::StubBackend;
use live_detect::pipeline::{result_index, ReplayCursor, ReplayTick};
use live_detect::{
    BackendRegistry, CallbackListener, DecodedVideo, DetectError, DetectorBackend,
    ExecutionBackend, PipelineConfig, ReplayHandle, RunningMode, SyntheticVideo,
};

fn stub_registry(make: fn() -> StubBackend) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(ExecutionBackend::Cpu, move |_| {
        Ok(Box::new(make()) as Box<dyn DetectorBackend>)
    });
    registry
}

fn sampled(duration_ms: u64, interval_ms: u64, unreadable: &[u64]) -> DecodedVideo {
    let mut decoder = SyntheticVideo::open("stub://clip", duration_ms, 48, 32)
        .unwrap()
        .with_unreadable(unreadable);
    DecodedVideo::sample(&mut decoder, interval_ms).unwrap()
}

#[test]
fn replay_scenario_from_playback_clock() {
    assert_eq!(result_index(950, 300), 3);
    let mut cursor = ReplayCursor::new(10, 300);
    assert_eq!(cursor.tick(950), ReplayTick::Emit(3));
    assert_eq!(cursor.tick(3100), ReplayTick::Finished);
    assert_eq!(cursor.tick(3400), ReplayTick::Finished);
}

#[test]
fn indices_are_non_decreasing_and_bounded() {
    let len = 7;
    let mut cursor = ReplayCursor::new(len, 100);
    let mut emitted = Vec::new();
    for elapsed in (0..2000).step_by(37) {
        match cursor.tick(elapsed) {
            ReplayTick::Emit(i) => emitted.push(i),
            ReplayTick::Finished => break,
        }
    }
    assert!(cursor.is_finished());
    assert!(emitted.windows(2).all(|w| w[0] <= w[1]));
    assert!(emitted.iter().all(|&i| i < len));
    assert_eq!(emitted.last(), Some(&(len - 1)));
}

#[test]
fn replays_whole_batch_then_stops() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let sink = stamps.clone();
    let listener =
        CallbackListener::new().with_result(move |r| sink.lock().unwrap().push(r.timestamp_ms));

    let video = sampled(200, 20, &[]);
    assert_eq!(video.len(), 11);
    let mut handle = ReplayHandle::start(
        &PipelineConfig::default(),
        &stub_registry(StubBackend::new),
        video,
        Arc::new(listener),
    )
    .unwrap();
    handle.wait();
    assert!(handle.is_finished());

    let stamps = stamps.lock().unwrap().clone();
    assert!(!stamps.is_empty());
    assert_eq!(stamps.first(), Some(&0));
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert!(stamps.iter().all(|t| t % 20 == 0 && *t <= 200));
}

#[test]
fn unreadable_frames_leave_empty_slots() {
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let listener = CallbackListener::new().with_result(move |r| {
        sink.lock().unwrap().push((r.timestamp_ms, r.detections.len()))
    });

    let video = sampled(100, 25, &[50]);
    assert_eq!(video.len(), 4);
    let mut handle = ReplayHandle::start(
        &PipelineConfig::default(),
        &stub_registry(StubBackend::new),
        video,
        Arc::new(listener),
    )
    .unwrap();
    handle.wait();

    let results = results.lock().unwrap().clone();
    for (timestamp_ms, count) in results {
        if timestamp_ms == 50 {
            assert_eq!(count, 0);
        } else {
            assert_eq!(count, 1);
        }
    }
}

#[test]
fn empty_video_finishes_without_results_or_errors() {
    let events = Arc::new(AtomicUsize::new(0));
    let on_result = events.clone();
    let on_error = events.clone();
    let listener = CallbackListener::new()
        .with_result(move |_| {
            on_result.fetch_add(1, Ordering::SeqCst);
        })
        .with_error(move |_, _| {
            on_error.fetch_add(1, Ordering::SeqCst);
        });

    let video = sampled(60, 30, &[0, 30, 60]);
    assert!(video.is_empty());
    let mut handle = ReplayHandle::start(
        &PipelineConfig::default(),
        &stub_registry(StubBackend::new),
        video,
        Arc::new(listener),
    )
    .unwrap();
    handle.wait();
    assert_eq!(events.load(Ordering::SeqCst), 0);
}

#[test]
fn engine_without_video_mode_fails_at_start() {
    let registry = stub_registry(|| StubBackend::new().with_modes(&[RunningMode::Image]));
    let err = ReplayHandle::start(
        &PipelineConfig::default(),
        &registry,
        sampled(100, 50, &[]),
        Arc::new(CallbackListener::new()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, DetectError::EngineInit(_)));
}

#[test]
fn stop_ends_replay_early() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    let listener = CallbackListener::new().with_result(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut handle = ReplayHandle::start(
        &PipelineConfig::default(),
        &stub_registry(StubBackend::new),
        sampled(5000, 50, &[]),
        Arc::new(listener),
    )
    .unwrap();
    thread::sleep(Duration::from_millis(120));
    handle.stop();
    assert!(handle.is_finished());

    let at_stop = delivered.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
    assert_eq!(delivered.load(Ordering::SeqCst), at_stop);
    assert!(at_stop < 101);
}

#[test]
fn replayed_results_report_batch_average_inference_time() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let sink = times.clone();
    let listener = CallbackListener::new()
        .with_result(move |r| sink.lock().unwrap().push(r.inference_time_ms));

    let video = sampled(90, 30, &[30]);
    assert_eq!(video.len(), 3);
    let mut handle = ReplayHandle::start(
        &PipelineConfig::default(),
        &stub_registry(|| StubBackend::new().with_latency(Duration::from_millis(15))),
        video,
        Arc::new(listener),
    )
    .unwrap();
    handle.wait();

    let times = times.lock().unwrap().clone();
    assert!(!times.is_empty());
    // The gap slot at 30ms reports the same average as its neighbours.
    assert!(times.iter().all(|t| *t == times[0]));
    assert!(times[0] >= 10);
}

#[test]
fn stop_during_batch_detection_does_not_wait_for_the_batch() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    let error_counter = delivered.clone();
    let listener = CallbackListener::new()
        .with_result(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_error(move |_, _| {
            error_counter.fetch_add(1, Ordering::SeqCst);
        });

    let (call_counter, release_counter) = (calls.clone(), released.clone());
    let mut registry = BackendRegistry::new();
    registry.register(ExecutionBackend::Cpu, move |_| {
        Ok(Box::new(
            StubBackend::new()
                .with_latency(Duration::from_millis(50))
                .with_call_counter(call_counter.clone())
                .with_release_counter(release_counter.clone()),
        ) as Box<dyn DetectorBackend>)
    });

    let video = sampled(1200, 30, &[]);
    assert_eq!(video.len(), 41);
    let mut handle =
        ReplayHandle::start(&PipelineConfig::default(), &registry, video, Arc::new(listener))
            .unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    handle.stop();
    assert!(started.elapsed() < Duration::from_millis(100));
    handle.stop();

    // The frame in flight finishes, then the worker gives up the batch.
    thread::sleep(Duration::from_millis(250));
    assert!(calls.load(Ordering::SeqCst) <= 2);
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
}
