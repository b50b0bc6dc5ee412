use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use live_detect::config::{AppConfig, ExecutionBackend, ModelVariant};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVE_DETECT_CONFIG",
        "LIVE_DETECT_THRESHOLD",
        "LIVE_DETECT_MAX_RESULTS",
        "LIVE_DETECT_BACKEND",
        "LIVE_DETECT_MODEL",
        "LIVE_DETECT_SOURCE",
        "LIVE_DETECT_SAMPLE_INTERVAL_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("load defaults");
    assert_eq!(cfg.pipeline.confidence_threshold, 0.4);
    assert_eq!(cfg.pipeline.max_results, 5);
    assert_eq!(cfg.pipeline.execution_backend, ExecutionBackend::Cpu);
    assert_eq!(cfg.camera.uri, "stub://back_camera");
    assert_eq!(cfg.replay.sample_interval_ms, 300);
    assert_eq!(cfg.viewport.width, 340.0);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "pipeline": {
            "confidence_threshold": 0.6,
            "max_results": 3,
            "execution_backend": "gpu",
            "model_variant": "efficientdet_lite2",
            "model_dir": "/opt/models"
        },
        "camera": {
            "uri": "stub://front_camera",
            "target_fps": 30,
            "width": 640,
            "height": 480
        },
        "replay": { "sample_interval_ms": 250 },
        "viewport": { "width": 400.0, "height": 300.0 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_THRESHOLD", "0.25");
    std::env::set_var("LIVE_DETECT_BACKEND", "cpu");
    std::env::set_var("LIVE_DETECT_SAMPLE_INTERVAL_MS", "500");

    let cfg = AppConfig::load().expect("load config");

    assert_eq!(cfg.pipeline.confidence_threshold, 0.25);
    assert_eq!(cfg.pipeline.max_results, 3);
    assert_eq!(cfg.pipeline.execution_backend, ExecutionBackend::Cpu);
    assert_eq!(cfg.pipeline.model_variant, ModelVariant::EfficientDetLite2);
    assert_eq!(cfg.pipeline.model_dir.to_str(), Some("/opt/models"));
    assert_eq!(cfg.camera.uri, "stub://front_camera");
    assert_eq!(cfg.camera.target_fps, 30);
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.replay.sample_interval_ms, 500);
    assert_eq!((cfg.viewport.width, cfg.viewport.height), (400.0, 300.0));

    clear_env();
}

#[test]
fn toml_files_are_accepted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
        [pipeline]
        max_results = 1

        [camera]
        uri = "stub://kitchen"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_MODEL", "lite2");

    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.pipeline.max_results, 1);
    assert_eq!(cfg.pipeline.model_variant, ModelVariant::EfficientDetLite2);
    assert_eq!(cfg.camera.uri, "stub://kitchen");
    assert_eq!(cfg.camera.target_fps, 15);

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_THRESHOLD", "1.5");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_MAX_RESULTS", "0");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_SAMPLE_INTERVAL_MS", "0");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_BACKEND", "tpu");
    assert!(AppConfig::load().is_err());
    clear_env();
}
