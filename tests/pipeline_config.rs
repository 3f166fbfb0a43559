use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use sightline::config::PipelineConfig;
use sightline::output::VideoFormat;
use sightline::{ClassSelection, PipelineError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SIGHTLINE_CONFIG",
        "SIGHTLINE_CONFIDENCE",
        "SIGHTLINE_CLASSES",
        "SIGHTLINE_RECORD",
        "SIGHTLINE_RECORD_FPS",
        "SIGHTLINE_OUTPUT_DIR",
        "SIGHTLINE_MODEL",
        "SIGHTLINE_CAMERA_DEVICE",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_match_the_interactive_app() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load defaults");
    assert_eq!(cfg.detection.confidence_threshold, 0.40);
    assert_eq!(cfg.detection.selection, ClassSelection::All);
    assert_eq!(cfg.detection.max_consecutive_failures, 3);
    assert!(!cfg.recording.enabled);
    assert_eq!(cfg.recording.fps, None);
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.model.path, "stub://coco");
    assert_eq!(cfg.model.input_size, 640);
    assert_eq!(cfg.recording.format, VideoFormat::preferred());
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "detection": {
                "confidence_threshold": 0.6,
                "classes": ["person", "dog"],
                "max_consecutive_failures": 5
            },
            "recording": {
                "enabled": true,
                "fps": 15.0,
                "output_dir": "clips",
                "format": "y4m"
            },
            "camera": {
                "device": "/dev/video2",
                "width": 1280,
                "height": 720,
                "fps": 30
            },
            "model": {
                "path": "models/yolov8n.onnx",
                "input_size": 320
            }
        }"#,
    );

    std::env::set_var("SIGHTLINE_CONFIG", file.path());
    std::env::set_var("SIGHTLINE_CONFIDENCE", "0.25");
    std::env::set_var("SIGHTLINE_OUTPUT_DIR", "/tmp/sightline");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.detection.confidence_threshold, 0.25);
    assert_eq!(cfg.detection.selection, ClassSelection::only(["dog", "person"]));
    assert_eq!(cfg.detection.max_consecutive_failures, 5);
    assert!(cfg.recording.enabled);
    assert_eq!(cfg.recording.fps, Some(15.0));
    assert_eq!(cfg.recording.output_dir, PathBuf::from("/tmp/sightline"));
    assert_eq!(cfg.recording.format, VideoFormat::Y4m);
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (1280, 720, 30));
    assert_eq!(cfg.model.path, "models/yolov8n.onnx");
    assert_eq!(cfg.model.input_size, 320);

    let options = cfg.stream_options();
    assert_eq!(options.confidence_threshold, 0.25);
    assert_eq!(options.record_fps, Some(15.0));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
[detection]
classes = "All classes"

[recording]
format = "y4m"
"#,
    );
    std::env::set_var("SIGHTLINE_CONFIG", file.path());
    std::env::set_var("SIGHTLINE_CLASSES", "car, truck");
    std::env::set_var("SIGHTLINE_RECORD", "yes");

    let cfg = PipelineConfig::load().expect("load toml config");
    assert_eq!(cfg.detection.selection, ClassSelection::only(["car", "truck"]));
    assert!(cfg.recording.enabled);

    clear_env();
}

#[test]
fn out_of_range_threshold_is_clamped() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTLINE_CONFIDENCE", "1.7");
    let cfg = PipelineConfig::load().expect("load config");
    assert_eq!(cfg.detection.confidence_threshold, 1.0);

    clear_env();
}

#[test]
fn rejects_unusable_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTLINE_RECORD_FPS", "0");
    let err = PipelineConfig::load().expect_err("zero fps must be rejected");
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Config(_))
    ));
    clear_env();

    std::env::set_var("SIGHTLINE_RECORD", "maybe");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    let file = config_file(".json", r#"{ "detection": { "confidence": 0.5 } }"#);
    std::env::set_var("SIGHTLINE_CONFIG", file.path());
    assert!(
        PipelineConfig::load().is_err(),
        "unknown keys should be reported"
    );
    clear_env();
}
