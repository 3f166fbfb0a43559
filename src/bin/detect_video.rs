//! detect_video - detect objects in every frame of a video file

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use sightline::app::{build_detector, cancel_on_ctrlc, init_logging};
use sightline::ingest::{FileConfig, FileSource, FrameSource};
use sightline::output::{processed_video_path, FixedPathSinks, VideoFormat};
use sightline::stream::{CancelToken, StreamStatus};
use sightline::ui::Ui;
use sightline::{ClassSelection, PipelineConfig, RecordingControl, RecordingManager, StreamDriver};

#[derive(Parser, Debug)]
#[command(
    name = "detect_video",
    about = "Detect objects in a video file, optionally writing an annotated copy"
)]
struct Args {
    /// Video file to process, or stub://name for a synthetic clip.
    input: String,
    /// Minimum confidence for a detection to be drawn.
    #[arg(long)]
    confidence: Option<f32>,
    /// `all`, or a comma separated list of class names.
    #[arg(long)]
    classes: Option<ClassSelection>,
    /// ONNX model path, or stub://coco.
    #[arg(long, env = "SIGHTLINE_MODEL")]
    model: Option<String>,
    /// Write `<name>_processed.<ext>` to the output directory.
    #[arg(long)]
    save: bool,
    /// Output directory.
    #[arg(long, env = "SIGHTLINE_OUTPUT_DIR")]
    out: Option<PathBuf>,
    /// Video format for the annotated copy: y4m or mp4.
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
    cfg.validate()?;

    let detector = {
        let _stage = ui.stage("Load model");
        build_detector(&cfg.model)?
    };
    let source = {
        let _stage = ui.stage("Open video");
        FileSource::new(FileConfig::new(args.input.clone()))?
    };
    let info = source.info();

    let cancel = CancelToken::new();
    cancel_on_ctrlc(&cancel)?;

    let bar = ui.stream(info.frame_count);
    let mut driver =
        StreamDriver::new(source, detector, bar, cfg.stream_options()).with_cancel(cancel);
    let output = if args.save || cfg.recording.enabled {
        let path = processed_video_path(
            Path::new(&args.input),
            &cfg.recording.output_dir,
            cfg.recording.format,
        );
        let sinks = FixedPathSinks::new(path.clone(), cfg.recording.format);
        driver = driver.with_recorder(RecordingManager::new(sinks), RecordingControl::new(true));
        Some(path)
    } else {
        None
    };

    let report = driver.run();
    match report.status {
        StreamStatus::Failed(err) => Err(anyhow!(err)),
        StreamStatus::Completed | StreamStatus::Cancelled => {
            if let Some(path) = output {
                println!("{}", path.display());
            }
            Ok(())
        }
    }
}
