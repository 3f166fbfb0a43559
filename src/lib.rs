//! Sightline: object detection over images, video files and live cameras.
//!
//! Frames flow through one strictly ordered pipeline:
//!
//! source → detector (with class filter) → annotator → display, recording
//!
//! # Guarantees
//!
//! 1. **Threshold**: every reported detection has `confidence >= threshold`.
//! 2. **Class filter**: a selection of names restricts detections to those
//!    classes; "all" (or nothing) means no filtering.
//! 3. **Deterministic rendering**: the same frame and detections always
//!    produce byte-identical output.
//! 4. **Flushed recordings**: an open recording is closed exactly once,
//!    whichever way the stream ends.
//! 5. **Terminal status**: a stream always reports how it ended.
//!
//! # Module Structure
//!
//! - `frame`: RGB frame buffer
//! - `detect`: model backends, detector adapter, class filter
//! - `annotate`: box and label rendering
//! - `stream`: per-frame driver, progress, display sinks, cancellation
//! - `record`: recording state machine and video sink traits
//! - `ingest`: frame sources (images, files, cameras, synthetic)
//! - `output`: image and video writers, output naming
//! - `config`, `ui`, `app`: configuration, terminal output, binary glue

pub mod annotate;
pub mod app;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod output;
pub mod record;
pub mod stream;
pub mod ui;

pub use annotate::Annotator;
pub use config::PipelineConfig;
pub use detect::{
    resolve, BoundingBox, ClassNameMap, ClassSelection, Detection, DetectorAdapter,
    DetectorBackend, StubBackend,
};
pub use error::{PipelineError, PipelineResult};
pub use frame::{Frame, FrameShape};
pub use ingest::{FrameSource, SourceInfo};
pub use record::{
    RecordingControl, RecordingManager, RecordingSpec, RecordingSummary, VideoSink,
    VideoSinkFactory,
};
pub use stream::{
    CancelToken, DisplaySink, StreamDriver, StreamEvent, StreamOptions, StreamProgress,
    StreamReport, StreamStatus,
};
