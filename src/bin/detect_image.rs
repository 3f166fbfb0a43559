//! detect_image - detect objects in one still image

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use sightline::app::{build_detector, init_logging};
use sightline::ingest::ImageSource;
use sightline::output::{processed_image_path, save_image};
use sightline::stream::{LastFrame, StreamStatus};
use sightline::ui::Ui;
use sightline::{ClassSelection, PipelineConfig, StreamDriver};

#[derive(Parser, Debug)]
#[command(
    name = "detect_image",
    about = "Detect objects in an image and write an annotated copy"
)]
struct Args {
    /// Image to process (any format the image decoder supports).
    input: PathBuf,
    /// Minimum confidence for a detection to be drawn.
    #[arg(long)]
    confidence: Option<f32>,
    /// `all`, or a comma separated list of class names.
    #[arg(long)]
    classes: Option<ClassSelection>,
    /// ONNX model path, or stub://coco.
    #[arg(long, env = "SIGHTLINE_MODEL")]
    model: Option<String>,
    /// Directory for `<name>_processed.png`.
    #[arg(long, env = "SIGHTLINE_OUTPUT_DIR")]
    out: Option<PathBuf>,
    /// Run detection without writing the annotated image.
    #[arg(long)]
    no_save: bool,
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
    cfg.validate()?;

    let detector = {
        let _stage = ui.stage("Load model");
        build_detector(&cfg.model)?
    };
    let source = {
        let _stage = ui.stage("Decode image");
        ImageSource::open(&args.input)?
    };

    let mut result = LastFrame::new();
    let report = {
        let _stage = ui.stage("Detect objects");
        let mut driver = StreamDriver::new(source, detector, &mut result, cfg.stream_options());
        driver.run()
    };
    if let StreamStatus::Failed(err) = report.status {
        return Err(anyhow!(err));
    }

    if args.no_save {
        return Ok(());
    }
    let frame = result
        .frame()
        .ok_or_else(|| anyhow!("no frame was produced for {}", args.input.display()))?;
    let path = processed_image_path(&args.input, &cfg.recording.output_dir);
    {
        let _stage = ui.stage("Save annotated image");
        save_image(frame, &path)?;
    }
    println!("{}", path.display());
    Ok(())
}
