//! Recording state machine.
//!
//! `RecordingManager` owns at most one open output video sink. It is either
//! CLOSED or OPEN; every transition is idempotent, and the sink is finished
//! exactly once per OPEN -> CLOSED transition, including when the manager is
//! dropped while still open.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::Frame;

/// Output video sink. Owned exclusively by the recording manager.
pub trait VideoSink: Send {
    /// Encode one frame. Frames arrive in stream order.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close. Called exactly once.
    fn finish(&mut self) -> Result<()>;

    /// Human readable destination, for logs and notifications.
    fn destination(&self) -> String {
        "video sink".to_string()
    }
}

/// Opens a new sink for each recording session.
///
/// The caller decides where output goes; the pipeline only hands over the
/// frame geometry and rate.
pub trait VideoSinkFactory: Send {
    fn open(&mut self, spec: &RecordingSpec) -> Result<Box<dyn VideoSink>>;
}

impl<F> VideoSinkFactory for F
where
    F: FnMut(&RecordingSpec) -> Result<Box<dyn VideoSink>> + Send,
{
    fn open(&mut self, spec: &RecordingSpec) -> Result<Box<dyn VideoSink>> {
        self(spec)
    }
}

/// Geometry and rate of a recording.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordingSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl RecordingSpec {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self { width, height, fps }
    }
}

/// An open recording.
pub struct RecordingSession {
    sink: Box<dyn VideoSink>,
    spec: RecordingSpec,
    started_at: DateTime<Local>,
    frames_written: u64,
}

impl RecordingSession {
    pub fn spec(&self) -> RecordingSpec {
        self.spec
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn destination(&self) -> String {
        self.sink.destination()
    }
}

/// What a closed session produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordingSummary {
    pub destination: String,
    pub spec: RecordingSpec,
    pub started_at: DateTime<Local>,
    pub frames_written: u64,
}

enum RecordingState {
    Closed,
    Open(RecordingSession),
}

pub struct RecordingManager {
    factory: Box<dyn VideoSinkFactory>,
    state: RecordingState,
}

impl RecordingManager {
    pub fn new<F: VideoSinkFactory + 'static>(factory: F) -> Self {
        Self {
            factory: Box::new(factory),
            state: RecordingState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, RecordingState::Open(_))
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        match &self.state {
            RecordingState::Open(session) => Some(session),
            RecordingState::Closed => None,
        }
    }

    /// CLOSED -> OPEN. When already open, returns the existing session.
    pub fn start(&mut self, spec: RecordingSpec) -> Result<&RecordingSession> {
        if let RecordingState::Closed = self.state {
            if spec.width == 0 || spec.height == 0 {
                return Err(anyhow!(
                    "cannot record {}x{} frames",
                    spec.width,
                    spec.height
                ));
            }
            if !(spec.fps.is_finite() && spec.fps > 0.0) {
                return Err(anyhow!("recording rate must be positive, got {}", spec.fps));
            }
            let sink = self.factory.open(&spec)?;
            log::info!(
                "recording started: {} ({}x{} @ {:.2} fps)",
                sink.destination(),
                spec.width,
                spec.height,
                spec.fps
            );
            self.state = RecordingState::Open(RecordingSession {
                sink,
                spec,
                started_at: Local::now(),
                frames_written: 0,
            });
        }
        match &self.state {
            RecordingState::Open(session) => Ok(session),
            RecordingState::Closed => Err(anyhow!("recording session missing after start")),
        }
    }

    /// Write a frame to the open session. No-op while CLOSED.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        let RecordingState::Open(session) = &mut self.state else {
            return Ok(());
        };
        if frame.width() != session.spec.width || frame.height() != session.spec.height {
            return Err(anyhow!(
                "frame {}x{} does not match recording {}x{}",
                frame.width(),
                frame.height(),
                session.spec.width,
                session.spec.height
            ));
        }
        session.sink.write_frame(frame)?;
        session.frames_written += 1;
        Ok(())
    }

    /// OPEN -> CLOSED. No-op returning `None` while CLOSED.
    ///
    /// The session leaves the manager before the sink is finished, so a
    /// failing finish still closes the session.
    pub fn stop(&mut self) -> Result<Option<RecordingSummary>> {
        let RecordingState::Open(mut session) =
            std::mem::replace(&mut self.state, RecordingState::Closed)
        else {
            return Ok(None);
        };
        let summary = RecordingSummary {
            destination: session.sink.destination(),
            spec: session.spec,
            started_at: session.started_at,
            frames_written: session.frames_written,
        };
        session.sink.finish()?;
        log::info!(
            "recording stopped: {} ({} frames)",
            summary.destination,
            summary.frames_written
        );
        Ok(Some(summary))
    }
}

impl Drop for RecordingManager {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("failed to close recording on drop: {:#}", err);
        }
    }
}

/// Shared "should be recording" flag, flipped by the caller mid-stream and
/// reconciled by the stream driver once per frame.
#[derive(Clone, Debug, Default)]
pub struct RecordingControl {
    wanted: Arc<AtomicBool>,
}

impl RecordingControl {
    pub fn new(record: bool) -> Self {
        Self {
            wanted: Arc::new(AtomicBool::new(record)),
        }
    }

    pub fn set(&self, record: bool) {
        self.wanted.store(record, Ordering::SeqCst);
    }

    /// Flip the flag, returning the new value.
    pub fn toggle(&self) -> bool {
        !self.wanted.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn wanted(&self) -> bool {
        self.wanted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counters {
        opened: usize,
        frames: Vec<usize>,
        finished: Vec<usize>,
    }

    struct CountingSink {
        index: usize,
        counters: Arc<Mutex<Counters>>,
    }

    impl VideoSink for CountingSink {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            self.counters.lock().unwrap().frames[self.index] += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.counters.lock().unwrap().finished[self.index] += 1;
            Ok(())
        }
    }

    fn manager() -> (RecordingManager, Arc<Mutex<Counters>>) {
        let counters = Arc::new(Mutex::new(Counters::default()));
        let shared = Arc::clone(&counters);
        let factory = move |_spec: &RecordingSpec| -> Result<Box<dyn VideoSink>> {
            let mut c = shared.lock().unwrap();
            let index = c.opened;
            c.opened += 1;
            c.frames.push(0);
            c.finished.push(0);
            Ok(Box::new(CountingSink {
                index,
                counters: Arc::clone(&shared),
            }))
        };
        (RecordingManager::new(factory), counters)
    }

    fn spec() -> RecordingSpec {
        RecordingSpec::new(4, 4, 20.0)
    }

    #[test]
    fn write_while_closed_is_a_no_op() {
        let (mut mgr, counters) = manager();
        let frame = Frame::filled(4, 4, [0, 0, 0]);
        mgr.write(&frame).unwrap();
        assert_eq!(counters.lock().unwrap().opened, 0);

        mgr.start(spec()).unwrap();
        mgr.write(&frame).unwrap();
        mgr.stop().unwrap();
        mgr.write(&frame).unwrap();

        let c = counters.lock().unwrap();
        assert_eq!(c.frames, vec![1]);
        assert_eq!(c.finished, vec![1]);
    }

    #[test]
    fn start_is_idempotent() {
        let (mut mgr, counters) = manager();
        mgr.start(spec()).unwrap();
        let again = mgr.start(RecordingSpec::new(8, 8, 30.0)).unwrap();
        assert_eq!(again.spec(), spec());
        assert_eq!(counters.lock().unwrap().opened, 1);
    }

    #[test]
    fn stop_is_idempotent_and_finishes_once() {
        let (mut mgr, counters) = manager();
        assert!(mgr.stop().unwrap().is_none());
        mgr.start(spec()).unwrap();
        let summary = mgr.stop().unwrap().expect("summary");
        assert_eq!(summary.frames_written, 0);
        assert!(mgr.stop().unwrap().is_none());
        assert_eq!(counters.lock().unwrap().finished, vec![1]);
    }

    #[test]
    fn drop_closes_open_session() {
        let (mut mgr, counters) = manager();
        mgr.start(spec()).unwrap();
        drop(mgr);
        assert_eq!(counters.lock().unwrap().finished, vec![1]);
    }

    #[test]
    fn mismatched_frame_size_is_rejected() {
        let (mut mgr, counters) = manager();
        mgr.start(spec()).unwrap();
        assert!(mgr.write(&Frame::filled(5, 4, [0, 0, 0])).is_err());
        assert_eq!(counters.lock().unwrap().frames, vec![0]);
    }

    #[test]
    fn invalid_spec_does_not_open() {
        let (mut mgr, counters) = manager();
        assert!(mgr.start(RecordingSpec::new(0, 4, 20.0)).is_err());
        assert!(mgr.start(RecordingSpec::new(4, 4, 0.0)).is_err());
        assert!(!mgr.is_open());
        assert_eq!(counters.lock().unwrap().opened, 0);
    }

    #[test]
    fn control_toggles() {
        let control = RecordingControl::new(false);
        let remote = control.clone();
        assert!(remote.toggle());
        assert!(control.wanted());
        assert!(!control.toggle());
        control.set(true);
        assert!(remote.wanted());
    }
}
