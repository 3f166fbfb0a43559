use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::ClassSelection;
use crate::error::PipelineError;
use crate::ingest::CameraConfig;
use crate::output::VideoFormat;
use crate::stream::{
    StreamOptions, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_CONSECUTIVE_FAILURES,
};

pub const DEFAULT_MODEL_PATH: &str = "stub://coco";
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 20;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    detection: Option<DetectionConfigFile>,
    recording: Option<RecordingConfigFile>,
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    classes: Option<ClassSelection>,
    max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RecordingConfigFile {
    enabled: Option<bool>,
    fps: Option<f64>,
    output_dir: Option<PathBuf>,
    format: Option<VideoFormat>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<String>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
}

/// Everything the pipeline binaries need, resolved from defaults, an
/// optional config file and `SIGHTLINE_*` environment overrides.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub detection: DetectionSettings,
    pub recording: RecordingSettings,
    pub camera: CameraConfig,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub selection: ClassSelection,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSettings {
    /// Record from the first frame.
    pub enabled: bool,
    /// Output rate. `None` follows the source.
    pub fps: Option<f64>,
    pub output_dir: PathBuf,
    pub format: VideoFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// ONNX file, or `stub://...` for the built-in deterministic detector.
    pub path: String,
    pub input_size: u32,
    pub iou_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGHTLINE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Options handed to the stream driver.
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            confidence_threshold: self.detection.confidence_threshold,
            selection: self.detection.selection.clone(),
            max_consecutive_failures: self.detection.max_consecutive_failures,
            record_fps: self.recording.fps,
        }
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let recording = file.recording.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        Self {
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                selection: detection.classes.unwrap_or_default(),
                max_consecutive_failures: detection
                    .max_consecutive_failures
                    .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            },
            recording: RecordingSettings {
                enabled: recording.enabled.unwrap_or(false),
                fps: recording.fps,
                output_dir: recording
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
                format: recording.format.unwrap_or_else(VideoFormat::preferred),
            },
            camera: CameraConfig {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            model: ModelSettings {
                path: model
                    .path
                    .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
                input_size: model.input_size.unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
                iou_threshold: model.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("SIGHTLINE_CONFIDENCE") {
            self.detection.confidence_threshold = value.trim().parse().map_err(|_| {
                anyhow!("SIGHTLINE_CONFIDENCE must be a number between 0 and 1")
            })?;
        }
        if let Ok(classes) = std::env::var("SIGHTLINE_CLASSES") {
            self.detection.selection = classes.parse::<ClassSelection>().unwrap_or_default();
        }
        if let Ok(value) = std::env::var("SIGHTLINE_RECORD") {
            self.recording.enabled = parse_bool(&value)
                .ok_or_else(|| anyhow!("SIGHTLINE_RECORD must be true or false"))?;
        }
        if let Ok(value) = std::env::var("SIGHTLINE_RECORD_FPS") {
            let fps: f64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGHTLINE_RECORD_FPS must be a number"))?;
            self.recording.fps = Some(fps);
        }
        if let Ok(dir) = std::env::var("SIGHTLINE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.recording.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("SIGHTLINE_MODEL") {
            if !path.trim().is_empty() {
                self.model.path = path;
            }
        }
        if let Ok(device) = std::env::var("SIGHTLINE_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with. An out-of-range
    /// threshold is clamped rather than rejected.
    pub fn validate(&mut self) -> Result<()> {
        let threshold = self.detection.confidence_threshold;
        let clamped = crate::detect::clamp_threshold(threshold);
        if clamped != threshold {
            log::warn!(
                "confidence threshold {} out of range, using {}",
                threshold,
                clamped
            );
            self.detection.confidence_threshold = clamped;
        }
        if self.detection.max_consecutive_failures == 0 {
            return Err(config_error("max_consecutive_failures must be at least 1"));
        }
        if let Some(fps) = self.recording.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(config_error(format!("recording fps must be positive, got {}", fps)));
            }
        }
        if !self.recording.format.is_available() {
            return Err(config_error(format!(
                "{} output is not available in this build",
                self.recording.format.extension()
            )));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(config_error("camera width and height must be non-zero"));
        }
        if self.model.input_size == 0 {
            return Err(config_error("model input_size must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.model.iou_threshold) {
            return Err(config_error("model iou_threshold must be within [0, 1]"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> anyhow::Error {
    PipelineError::Config(message.into()).into()
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
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

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
