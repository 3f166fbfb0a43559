//! detect_webcam - live detection from a camera, with on-demand recording
//!
//! Press Enter to start or stop recording. Ctrl-C ends the session; an open
//! recording is finalised first.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;

use sightline::app::{build_detector, cancel_on_ctrlc, init_logging};
use sightline::ingest::CameraSource;
use sightline::output::{TimestampedSinks, VideoFormat};
use sightline::stream::{CancelToken, StreamStatus, DEFAULT_RECORD_FPS};
use sightline::ui::Ui;
use sightline::{ClassSelection, PipelineConfig, RecordingControl, RecordingManager, StreamDriver};

#[derive(Parser, Debug)]
#[command(
    name = "detect_webcam",
    about = "Live object detection from a camera; press Enter to toggle recording"
)]
struct Args {
    /// Camera device, or stub://name for a synthetic feed.
    #[arg(long, env = "SIGHTLINE_CAMERA_DEVICE")]
    device: Option<String>,
    /// Minimum confidence for a detection to be drawn.
    #[arg(long)]
    confidence: Option<f32>,
    /// `all`, or a comma separated list of class names.
    #[arg(long)]
    classes: Option<ClassSelection>,
    /// ONNX model path, or stub://coco.
    #[arg(long, env = "SIGHTLINE_MODEL")]
    model: Option<String>,
    /// Start recording immediately.
    #[arg(long)]
    record: bool,
    /// Directory for `recording_<timestamp>.<ext>` files.
    #[arg(long, env = "SIGHTLINE_OUTPUT_DIR")]
    out: Option<PathBuf>,
    /// Recording format: y4m or mp4.
    #[arg(long)]
    format: Option<VideoFormat>,
    /// Output mode: auto, plain or pretty.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = PipelineConfig::load()?;
    if let Some(device) = args.device.clone() {
        cfg.camera.device = device;
    }
    if let Some(confidence) = args.confidence {
        cfg.detection.confidence_threshold = confidence;
    }
    if let Some(classes) = args.classes.clone() {
        cfg.detection.selection = classes;
    }
    if let Some(model) = args.model.clone() {
        cfg.model.path = model;
    }
    if let Some(out) = args.out.clone() {
        cfg.recording.output_dir = out;
    }
    if let Some(format) = args.format {
        cfg.recording.format = format;
    }
    // Webcam recordings use a fixed rate; capture timing is too uneven to
    // derive one from the device.
    cfg.recording.fps = Some(cfg.recording.fps.unwrap_or(DEFAULT_RECORD_FPS));
    cfg.validate()?;

    let detector = {
        let _stage = ui.stage("Load model");
        build_detector(&cfg.model)?
    };
    let source = CameraSource::new(cfg.camera.clone())?;

    let cancel = CancelToken::new();
    cancel_on_ctrlc(&cancel)?;

    let control = RecordingControl::new(args.record || cfg.recording.enabled);
    spawn_toggle_listener(control.clone());
    eprintln!("Press Enter to start/stop recording, Ctrl-C to quit.");

    let recorder = RecordingManager::new(TimestampedSinks::new(
        cfg.recording.output_dir.clone(),
        cfg.recording.format,
    ));
    let bar = ui.stream(None);
    let report = StreamDriver::new(source, detector, bar, cfg.stream_options())
        .with_recorder(recorder, control)
        .with_cancel(cancel)
        .run();

    for recording in &report.recordings {
        println!("{}", recording.destination);
    }
    match report.status {
        StreamStatus::Failed(err) => Err(anyhow!(err)),
        StreamStatus::Completed | StreamStatus::Cancelled => Ok(()),
    }
}

/// Each line on stdin flips the recording flag.
fn spawn_toggle_listener(control: RecordingControl) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() {
                break;
            }
            let recording = control.toggle();
            log::debug!("recording toggle -> {}", recording);
        }
    });
}
