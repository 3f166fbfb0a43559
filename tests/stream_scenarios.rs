use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use sightline::detect::{BoundingBox, ClassNameMap, RawDetection, StubBackend};
use sightline::ingest::{FrameSource, SourceInfo, SyntheticSource};
use sightline::record::{RecordingControl, RecordingManager, RecordingSpec, VideoSink};
use sightline::stream::{
    CancelToken, DisplaySink, DriverState, LastFrame, StreamDriver, StreamEvent, StreamOptions,
    StreamProgress, StreamStatus, DEFAULT_MAX_CONSECUTIVE_FAILURES,
};
use sightline::{DetectorAdapter, Frame, PipelineError};

const W: u32 = 32;
const H: u32 = 24;

fn names() -> ClassNameMap {
    ClassNameMap::from_names(["person", "car", "dog"])
}

/// One person per frame at 0.9.
fn backend() -> StubBackend {
    StubBackend::new(
        names(),
        vec![RawDetection {
            class_id: 0,
            confidence: 0.9,
            bbox: BoundingBox::new(4.0, 4.0, 20.0, 18.0),
        }],
    )
}

fn source(frames: u64) -> SyntheticSource {
    SyntheticSource::new(W, H, 20.0).with_frame_limit(frames)
}

fn options(threshold: f32) -> StreamOptions {
    StreamOptions {
        confidence_threshold: threshold,
        ..StreamOptions::default()
    }
}

/// Keeps every displayed frame and event; can flip the recording flag after
/// chosen frames.
#[derive(Default)]
struct Recorder {
    frames: Vec<Frame>,
    events: Vec<StreamEvent>,
    last_progress: Option<StreamProgress>,
    toggles: Vec<(u64, bool)>,
    control: Option<RecordingControl>,
    finished: bool,
}

impl DisplaySink for Recorder {
    fn show(&mut self, frame: &Frame, progress: &StreamProgress) -> Result<()> {
        self.frames.push(frame.clone());
        self.last_progress = Some(progress.clone());
        if let Some(control) = &self.control {
            for (after, wanted) in &self.toggles {
                if *after == progress.current {
                    control.set(*wanted);
                }
            }
        }
        Ok(())
    }

    fn event(&mut self, event: &StreamEvent) {
        self.events.push(event.clone());
    }

    fn finish(&mut self, _report: &sightline::StreamReport) {
        self.finished = true;
    }
}

#[derive(Default, Debug)]
struct SessionLog {
    frames: Vec<u64>,
    finished: Vec<u64>,
}

struct LoggedSink {
    index: usize,
    log: Arc<Mutex<SessionLog>>,
    fail_writes: bool,
}

impl VideoSink for LoggedSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow!("disk full"));
        }
        self.log.lock().unwrap().frames[self.index] += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.log.lock().unwrap().finished[self.index] += 1;
        Ok(())
    }

    fn destination(&self) -> String {
        format!("session-{}", self.index)
    }
}

fn logged_manager(fail_writes: bool) -> (RecordingManager, Arc<Mutex<SessionLog>>) {
    let log = Arc::new(Mutex::new(SessionLog::default()));
    let shared = Arc::clone(&log);
    let factory = move |_spec: &RecordingSpec| -> Result<Box<dyn VideoSink>> {
        let mut guard = shared.lock().unwrap();
        guard.frames.push(0);
        guard.finished.push(0);
        Ok(Box::new(LoggedSink {
            index: guard.frames.len() - 1,
            log: Arc::clone(&shared),
            fail_writes,
        }))
    };
    (RecordingManager::new(factory), log)
}

#[test]
fn ten_frame_stream_completes_with_full_progress() {
    let mut display = Recorder::default();
    let report = StreamDriver::new(
        source(10),
        DetectorAdapter::new(backend()),
        &mut display,
        options(0.4),
    )
    .run();

    assert_eq!(report.status, StreamStatus::Completed);
    assert_eq!(report.frames_processed, 10);
    assert_eq!(report.frames_skipped, 0);
    assert_eq!(report.progress.fraction(), Some(1.0));
    assert_eq!(display.frames.len(), 10);
    assert!(display.finished);

    // Annotated: the box changed pixels.
    let mut plain = source(10);
    let first = plain.next_frame().unwrap().unwrap();
    assert_ne!(display.frames[0], first);
}

#[test]
fn threshold_above_every_detection_leaves_frames_untouched() {
    let mut display = Recorder::default();
    let report = StreamDriver::new(
        source(5),
        DetectorAdapter::new(backend().unfiltered()),
        &mut display,
        options(0.95),
    )
    .run();

    assert_eq!(report.status, StreamStatus::Completed);
    let mut plain = source(5);
    for shown in &display.frames {
        let original = plain.next_frame().unwrap().unwrap();
        assert_eq!(shown, &original);
    }
    assert_eq!(display.frames.len(), 5);
}

#[test]
fn toggled_recording_produces_two_sessions_each_closed_once() {
    let (manager, log) = logged_manager(false);
    let control = RecordingControl::new(true);
    let mut display = Recorder {
        toggles: vec![(5, false), (6, true)],
        control: Some(control.clone()),
        ..Recorder::default()
    };

    let report = StreamDriver::new(
        source(9),
        DetectorAdapter::new(backend()),
        &mut display,
        options(0.4),
    )
    .with_recorder(manager, control)
    .run();

    assert_eq!(report.status, StreamStatus::Completed);
    let log = log.lock().unwrap();
    assert_eq!(log.frames, vec![5, 3]);
    assert_eq!(log.finished, vec![1, 1]);

    let written: Vec<u64> = report.recordings.iter().map(|r| r.frames_written).collect();
    assert_eq!(written, vec![5, 3]);
    assert_eq!(report.recordings[0].spec, RecordingSpec::new(W, H, 20.0));

    let started = display
        .events
        .iter()
        .filter(|e| matches!(e, StreamEvent::RecordingStarted { .. }))
        .count();
    let stopped = display
        .events
        .iter()
        .filter(|e| matches!(e, StreamEvent::RecordingStopped(_)))
        .count();
    assert_eq!((started, stopped), (2, 2));
}

#[test]
fn three_consecutive_detection_failures_abort_the_stream() {
    let (manager, log) = logged_manager(false);
    let mut display = Recorder::default();
    let report = StreamDriver::new(
        source(10),
        DetectorAdapter::new(backend().fail_on_calls([2, 3, 4])),
        &mut display,
        options(0.4),
    )
    .with_recorder(manager, RecordingControl::new(true))
    .run();

    match &report.status {
        StreamStatus::Failed(PipelineError::ModelUnavailable {
            consecutive_failures,
            ..
        }) => assert_eq!(*consecutive_failures, 3),
        other => panic!("expected ModelUnavailable, got {:?}", other),
    }
    assert_eq!(report.frames_processed, 4);
    assert_eq!(report.frames_skipped, 2);
    // The open recording was still flushed.
    assert_eq!(log.lock().unwrap().finished, vec![1]);
}

#[test]
fn two_failures_followed_by_success_do_not_abort() {
    let mut display = Recorder::default();
    let report = StreamDriver::new(
        source(6),
        DetectorAdapter::new(backend().fail_on_calls([1, 2])),
        &mut display,
        options(0.4),
    )
    .run();

    assert_eq!(report.status, StreamStatus::Completed);
    assert_eq!(report.frames_processed, 6);
    assert_eq!(report.frames_skipped, 2);

    // Skipped frames were passed through unannotated.
    let mut plain = source(6);
    let originals: Vec<Frame> = (0..6).map(|_| plain.next_frame().unwrap().unwrap()).collect();
    assert_eq!(display.frames[1], originals[1]);
    assert_eq!(display.frames[2], originals[2]);
    assert_ne!(display.frames[3], originals[3]);
    let skipped = display
        .events
        .iter()
        .filter(|e| matches!(e, StreamEvent::FrameSkipped { .. }))
        .count();
    assert_eq!(skipped, 2);
}

/// Yields `good` frames, then fails.
struct BrokenSource {
    inner: SyntheticSource,
    good: u64,
}

impl FrameSource for BrokenSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.inner.produced() >= self.good {
            return Err(anyhow!("device unplugged"));
        }
        self.inner.next_frame()
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            frame_count: None,
            ..self.inner.info()
        }
    }
}

#[test]
fn source_failure_stops_with_unavailable_and_closes_recording() {
    let (manager, log) = logged_manager(false);
    let broken = BrokenSource {
        inner: SyntheticSource::new(W, H, 20.0),
        good: 3,
    };
    let report = StreamDriver::new(
        broken,
        DetectorAdapter::new(backend()),
        LastFrame::new(),
        options(0.4),
    )
    .with_recorder(manager, RecordingControl::new(true))
    .run();

    assert!(matches!(
        report.status,
        StreamStatus::Failed(PipelineError::SourceUnavailable(_))
    ));
    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.progress.fraction(), None);
    let log = log.lock().unwrap();
    assert_eq!(log.frames, vec![3]);
    assert_eq!(log.finished, vec![1]);
}

#[test]
fn sink_write_errors_are_reported_without_stopping_detection() {
    let (manager, log) = logged_manager(true);
    let mut display = Recorder::default();
    let report = StreamDriver::new(
        source(4),
        DetectorAdapter::new(backend()),
        &mut display,
        options(0.4),
    )
    .with_recorder(manager, RecordingControl::new(true))
    .run();

    assert_eq!(report.status, StreamStatus::Completed);
    assert_eq!(report.frames_processed, 4);
    assert_eq!(report.sink_errors, 4);
    let failures = display
        .events
        .iter()
        .filter(|e| matches!(e, StreamEvent::SinkWriteFailed { error: PipelineError::SinkWrite(_), .. }))
        .count();
    assert_eq!(failures, 4);
    assert_eq!(log.lock().unwrap().finished, vec![1]);
}

#[test]
fn cancellation_is_honoured_between_frames() {
    let cancel = CancelToken::new();
    let mut driver = StreamDriver::new(
        SyntheticSource::new(W, H, 20.0),
        DetectorAdapter::new(backend()),
        LastFrame::new(),
        options(0.4),
    )
    .with_cancel(cancel.clone());
    cancel.cancel();

    let report = driver.run();
    assert_eq!(report.status, StreamStatus::Cancelled);
    assert_eq!(report.frames_processed, 0);
    assert_eq!(driver.state(), &DriverState::Stopped(StreamStatus::Cancelled));
}

#[test]
fn a_stopped_driver_does_not_run_again() {
    let mut driver = StreamDriver::new(
        source(2),
        DetectorAdapter::new(backend()),
        LastFrame::new(),
        options(0.4),
    );
    assert_eq!(driver.state(), &DriverState::Idle);
    let first = driver.run();
    let second = driver.run();
    assert_eq!(first, second);
    assert_eq!(driver.into_display().shown(), 2);
}

#[test]
fn class_selection_limits_what_is_drawn() {
    let detections = vec![
        RawDetection {
            class_id: 0,
            confidence: 0.9,
            bbox: BoundingBox::new(2.0, 2.0, 10.0, 10.0),
        },
        RawDetection {
            class_id: 1,
            confidence: 0.9,
            bbox: BoundingBox::new(14.0, 2.0, 30.0, 20.0),
        },
    ];
    let run = |selection: &str| {
        let mut display = LastFrame::new();
        StreamDriver::new(
            source(1),
            DetectorAdapter::new(StubBackend::new(names(), detections.clone())),
            &mut display,
            StreamOptions {
                selection: selection.parse().unwrap(),
                ..options(0.4)
            },
        )
        .run();
        display.into_frame().unwrap()
    };

    let everything = run("all");
    let people = run("person");
    let unknown = run("unicorn");
    assert_ne!(everything, people);
    // A selection that matches nothing falls back to all classes.
    assert_eq!(everything, unknown);
}

/// Sets `released` when dropped; optionally refuses to connect.
struct Tracked {
    inner: SyntheticSource,
    released: Arc<AtomicBool>,
    refuse_connect: bool,
}

impl Tracked {
    fn new(frames: u64, refuse_connect: bool) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let source = Self {
            inner: source(frames),
            released: Arc::clone(&released),
            refuse_connect,
        };
        (source, released)
    }
}

impl FrameSource for Tracked {
    fn connect(&mut self) -> Result<()> {
        if self.refuse_connect {
            return Err(anyhow!("device busy"));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.inner.next_frame()
    }

    fn info(&self) -> SourceInfo {
        self.inner.info()
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[test]
fn stopped_driver_releases_its_source() {
    let (tracked, released) = Tracked::new(2, false);
    let mut driver = StreamDriver::new(
        tracked,
        DetectorAdapter::new(backend()),
        LastFrame::new(),
        options(0.4),
    );
    assert!(driver.holds_source());

    let report = driver.run();
    assert_eq!(report.status, StreamStatus::Completed);
    assert_eq!(driver.state(), &DriverState::Stopped(StreamStatus::Completed));
    assert!(!driver.holds_source());
    assert!(released.load(Ordering::SeqCst));

    // The stored report survives the release.
    assert_eq!(driver.run(), report);
}

#[test]
fn source_that_fails_to_connect_is_released_too() {
    let (tracked, released) = Tracked::new(2, true);
    let mut driver = StreamDriver::new(
        tracked,
        DetectorAdapter::new(backend()),
        LastFrame::new(),
        options(0.4),
    );

    let report = driver.run();
    assert!(matches!(
        report.status,
        StreamStatus::Failed(PipelineError::SourceUnavailable(_))
    ));
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(driver.into_display().shown(), 0);
}

/// Rejects the frames whose index is listed.
struct FlakyDisplay {
    fail_on: Vec<u64>,
}

impl DisplaySink for FlakyDisplay {
    fn show(&mut self, _frame: &Frame, progress: &StreamProgress) -> Result<()> {
        if self.fail_on.contains(&progress.current) {
            return Err(anyhow!("window closed"));
        }
        Ok(())
    }
}

#[test]
fn display_errors_are_reported_without_stopping_detection_or_recording() {
    let (manager, log) = logged_manager(false);
    let mut recorder = Recorder::default();
    let display = (FlakyDisplay { fail_on: vec![2, 4] }, &mut recorder);

    let report = StreamDriver::new(
        source(5),
        DetectorAdapter::new(backend()),
        display,
        options(0.4),
    )
    .with_recorder(manager, RecordingControl::new(true))
    .run();

    assert_eq!(report.status, StreamStatus::Completed);
    assert_eq!(report.frames_processed, 5);
    assert_eq!(report.sink_errors, 2);

    let failed_frames: Vec<u64> = recorder
        .events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::SinkWriteFailed {
                frame,
                error: PipelineError::SinkWrite(_),
            } => Some(*frame),
            _ => None,
        })
        .collect();
    assert_eq!(failed_frames, vec![2, 4]);

    // The other half of the fan-out and the recording saw every frame.
    assert_eq!(recorder.frames.len(), 5);
    assert!(recorder.finished);
    let log = log.lock().unwrap();
    assert_eq!(log.frames, vec![5]);
    assert_eq!(log.finished, vec![1]);
}

#[test]
fn zero_failure_limit_falls_back_to_the_default() {
    let mut driver = StreamDriver::new(
        source(4),
        DetectorAdapter::new(backend().fail_on_calls([1])),
        LastFrame::new(),
        StreamOptions {
            max_consecutive_failures: 0,
            ..options(0.4)
        },
    );
    assert_eq!(
        driver.options().max_consecutive_failures,
        DEFAULT_MAX_CONSECUTIVE_FAILURES
    );

    let report = driver.run();
    assert_eq!(report.status, StreamStatus::Completed);
    assert_eq!(report.frames_processed, 4);
    assert_eq!(report.frames_skipped, 1);
}
