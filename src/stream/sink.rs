use anyhow::Result;

use super::driver::StreamReport;
use super::progress::StreamProgress;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::record::RecordingSummary;

/// Things worth telling the user about while a stream runs.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    RecordingStarted { destination: String },
    RecordingStopped(RecordingSummary),
    /// The display or the recording rejected a frame. The stream goes on.
    SinkWriteFailed { frame: u64, error: PipelineError },
    /// Detection failed; the frame was shown without annotations.
    FrameSkipped { frame: u64, error: PipelineError },
}

/// Where annotated frames are shown.
pub trait DisplaySink {
    fn show(&mut self, frame: &Frame, progress: &StreamProgress) -> Result<()>;

    fn event(&mut self, _event: &StreamEvent) {}

    /// Called once when the stream stops, whatever the status.
    fn finish(&mut self, _report: &StreamReport) {}
}

impl<D: DisplaySink + ?Sized> DisplaySink for Box<D> {
    fn show(&mut self, frame: &Frame, progress: &StreamProgress) -> Result<()> {
        (**self).show(frame, progress)
    }

    fn event(&mut self, event: &StreamEvent) {
        (**self).event(event)
    }

    fn finish(&mut self, report: &StreamReport) {
        (**self).finish(report)
    }
}

/// Fan out to two sinks. The second still sees the frame if the first fails.
impl<A: DisplaySink, B: DisplaySink> DisplaySink for (A, B) {
    fn show(&mut self, frame: &Frame, progress: &StreamProgress) -> Result<()> {
        let first = self.0.show(frame, progress);
        let second = self.1.show(frame, progress);
        match (first, second) {
            (Err(first), Err(second)) => {
                Err(first.context(format!("second sink also failed: {:#}", second)))
            }
            (first, second) => first.and(second),
        }
    }

    fn event(&mut self, event: &StreamEvent) {
        self.0.event(event);
        self.1.event(event);
    }

    fn finish(&mut self, report: &StreamReport) {
        self.0.finish(report);
        self.1.finish(report);
    }
}

/// Discards frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, _frame: &Frame, _progress: &StreamProgress) -> Result<()> {
        Ok(())
    }
}

/// Keeps the most recent frame, e.g. to save the result of a one-frame run.
#[derive(Clone, Debug, Default)]
pub struct LastFrame {
    frame: Option<Frame>,
    shown: u64,
}

impl LastFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn into_frame(self) -> Option<Frame> {
        self.frame
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl DisplaySink for LastFrame {
    fn show(&mut self, frame: &Frame, _progress: &StreamProgress) -> Result<()> {
        self.frame = Some(frame.clone());
        self.shown += 1;
        Ok(())
    }
}

impl<D: DisplaySink + ?Sized> DisplaySink for &mut D {
    fn show(&mut self, frame: &Frame, progress: &StreamProgress) -> Result<()> {
        (**self).show(frame, progress)
    }

    fn event(&mut self, event: &StreamEvent) {
        (**self).event(event)
    }

    fn finish(&mut self, report: &StreamReport) {
        (**self).finish(report)
    }
}
