use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::progress::StreamProgress;
use super::sink::{DisplaySink, StreamEvent};
use super::CancelToken;
use crate::annotate::Annotator;
use crate::detect::{AllowedClasses, ClassNameMap, ClassSelection, DetectorAdapter};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceInfo};
use crate::record::{RecordingControl, RecordingManager, RecordingSpec, RecordingSummary};

/// Rate used for recordings when neither the caller nor the source names one.
pub const DEFAULT_RECORD_FPS: f64 = 20.0;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.40;

/// Per-run settings, fixed at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub confidence_threshold: f32,
    pub selection: ClassSelection,
    /// Consecutive detection failures that abort the stream. Zero means the
    /// default.
    pub max_consecutive_failures: u32,
    /// Recording rate override. Defaults to the source rate.
    pub record_fps: Option<f64>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            selection: ClassSelection::All,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            record_fps: None,
        }
    }
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamStatus {
    /// The source ran out of frames.
    Completed,
    /// The caller cancelled.
    Cancelled,
    Failed(PipelineError),
}

impl StreamStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, StreamStatus::Failed(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DriverState {
    Idle,
    Running,
    Stopped(StreamStatus),
}

/// Outcome of one run. Always carries a terminal status.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamReport {
    pub status: StreamStatus,
    /// Frames that reached the display, annotated or not.
    pub frames_processed: u64,
    /// Frames shown unannotated because detection failed.
    pub frames_skipped: u64,
    /// Display and recording writes that failed.
    pub sink_errors: u64,
    pub progress: StreamProgress,
    /// Recordings closed during the run, in order.
    pub recordings: Vec<RecordingSummary>,
}

impl StreamReport {
    fn new(progress: StreamProgress) -> Self {
        Self {
            status: StreamStatus::Completed,
            frames_processed: 0,
            frames_skipped: 0,
            sink_errors: 0,
            progress,
            recordings: Vec::new(),
        }
    }
}

/// Pulls frames from a source and pushes each one through detection,
/// annotation, display and recording, strictly in order.
///
/// A driver runs once: `Idle -> Running -> Stopped`. Whatever ends the run,
/// the source is released and an open recording is closed before `run`
/// returns.
pub struct StreamDriver<S: FrameSource, D: DisplaySink> {
    /// `None` once the driver has stopped.
    source: Option<S>,
    detector: DetectorAdapter,
    names: Arc<ClassNameMap>,
    allowed: Option<AllowedClasses>,
    annotator: Annotator,
    display: D,
    recorder: Option<(RecordingManager, RecordingControl)>,
    cancel: CancelToken,
    options: StreamOptions,
    state: DriverState,
    last_report: Option<StreamReport>,
}

impl<S: FrameSource, D: DisplaySink> StreamDriver<S, D> {
    pub fn new(
        source: S,
        detector: DetectorAdapter,
        display: D,
        mut options: StreamOptions,
    ) -> Self {
        let names = detector.class_names();
        let allowed = options.selection.resolve(&names);
        // Zero would abort on the first failed detect.
        if options.max_consecutive_failures == 0 {
            options.max_consecutive_failures = DEFAULT_MAX_CONSECUTIVE_FAILURES;
        }
        Self {
            source: Some(source),
            detector,
            names,
            allowed,
            annotator: Annotator::default(),
            display,
            recorder: None,
            cancel: CancelToken::new(),
            options,
            state: DriverState::Idle,
            last_report: None,
        }
    }

    /// Record annotated frames whenever `control` asks for it.
    pub fn with_recorder(mut self, recorder: RecordingManager, control: RecordingControl) -> Self {
        self.recorder = Some((recorder, control));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the source handle is still held. False once stopped.
    pub fn holds_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn into_display(self) -> D {
        self.display
    }

    /// Run to a terminal status. A driver that already stopped returns its
    /// earlier report.
    pub fn run(&mut self) -> StreamReport {
        let Some(mut source) = self.source.take() else {
            log::warn!("StreamDriver: run called on a stopped stream");
            return self.last_report.clone().unwrap_or_else(|| {
                StreamReport::new(StreamProgress::new(None))
            });
        };

        let info = source.info();
        let mut report = StreamReport::new(StreamProgress::new(info.frame_count));
        self.state = DriverState::Running;
        log::info!(
            "StreamDriver: started on {} (backend {}, threshold {:.2}, classes {})",
            info,
            self.detector.backend_name(),
            self.options.confidence_threshold,
            self.options.selection
        );

        let status = match source.connect() {
            Ok(()) => self.pump(&mut source, &info, &mut report),
            Err(err) => {
                log::error!("StreamDriver: source failed to connect: {:#}", err);
                StreamStatus::Failed(PipelineError::SourceUnavailable(format!("{:#}", err)))
            }
        };
        drop(source);
        log::debug!("StreamDriver: source {} released", info.origin);

        self.close_recording(&mut report);
        report.status = status.clone();
        self.state = DriverState::Stopped(status);
        log::info!(
            "StreamDriver: stopped ({:?}) after {} frames, {} skipped, {} sink errors",
            report.status,
            report.frames_processed,
            report.frames_skipped,
            report.sink_errors
        );
        self.display.finish(&report);
        self.last_report = Some(report.clone());
        report
    }

    fn pump(
        &mut self,
        source: &mut S,
        info: &SourceInfo,
        report: &mut StreamReport,
    ) -> StreamStatus {
        let mut consecutive_failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return StreamStatus::Cancelled;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return StreamStatus::Completed,
                Err(err) => {
                    log::error!("StreamDriver: frame pull failed: {:#}", err);
                    return StreamStatus::Failed(PipelineError::SourceUnavailable(format!(
                        "{:#}",
                        err
                    )));
                }
            };
            report.progress.record_frame();
            let index = report.progress.current;

            self.reconcile_recording(&frame, info, report);

            let shown = match self.detector.detect(
                &frame,
                self.options.confidence_threshold,
                self.allowed.as_ref(),
            ) {
                Ok(detections) => {
                    consecutive_failures = 0;
                    log::debug!("StreamDriver: frame {}: {} detections", index, detections.len());
                    self.annotator.render(&frame, &detections, &self.names)
                }
                Err(err) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.options.max_consecutive_failures {
                        log::error!(
                            "StreamDriver: detection failed {} times in a row, aborting: {}",
                            consecutive_failures,
                            err
                        );
                        return StreamStatus::Failed(PipelineError::ModelUnavailable {
                            consecutive_failures,
                            last_error: err.to_string(),
                        });
                    }
                    log::warn!("StreamDriver: frame {} passed through unannotated: {}", index, err);
                    report.frames_skipped += 1;
                    self.display.event(&StreamEvent::FrameSkipped {
                        frame: index,
                        error: err,
                    });
                    frame
                }
            };

            self.emit(index, &shown, report);
            report.frames_processed += 1;
        }
    }

    /// Display first, then recording. Either may fail without stopping the
    /// other or the stream.
    fn emit(&mut self, index: u64, frame: &Frame, report: &mut StreamReport) {
        if let Err(err) = self.display.show(frame, &report.progress) {
            self.sink_failed(index, &err, report);
        }
        if let Some((recorder, _)) = &mut self.recorder {
            if let Err(err) = recorder.write(frame) {
                self.sink_failed(index, &err, report);
            }
        }
    }

    fn sink_failed(&mut self, index: u64, err: &anyhow::Error, report: &mut StreamReport) {
        log::warn!("StreamDriver: sink write failed on frame {}: {:#}", index, err);
        report.sink_errors += 1;
        self.display.event(&StreamEvent::SinkWriteFailed {
            frame: index,
            error: PipelineError::sink_write(err),
        });
    }

    /// Bring the recorder in line with what the caller currently wants.
    fn reconcile_recording(&mut self, frame: &Frame, info: &SourceInfo, report: &mut StreamReport) {
        let Some((recorder, control)) = &mut self.recorder else {
            return;
        };
        let wanted = control.wanted();
        if wanted && !recorder.is_open() {
            let fps = self
                .options
                .record_fps
                .or(info.fps)
                .filter(|fps| fps.is_finite() && *fps > 0.0)
                .unwrap_or(DEFAULT_RECORD_FPS);
            let spec = RecordingSpec::new(frame.width(), frame.height(), fps);
            let started = recorder.start(spec).map(|session| session.destination());
            match started {
                Ok(destination) => {
                    self.display
                        .event(&StreamEvent::RecordingStarted { destination });
                }
                Err(err) => {
                    // Do not retry on every frame; the caller can ask again.
                    control.set(false);
                    self.sink_failed(report.progress.current, &err, report);
                }
            }
        } else if !wanted && recorder.is_open() {
            self.close_recording(report);
        }
    }

    fn close_recording(&mut self, report: &mut StreamReport) {
        let Some((recorder, _)) = &mut self.recorder else {
            return;
        };
        match recorder.stop() {
            Ok(Some(summary)) => {
                report.recordings.push(summary.clone());
                self.display.event(&StreamEvent::RecordingStopped(summary));
            }
            Ok(None) => {}
            Err(err) => self.sink_failed(report.progress.current, &err, report),
        }
    }
}
