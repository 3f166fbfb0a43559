//! Per-frame orchestration: source -> detect -> annotate -> display/record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod driver;
mod progress;
mod sink;

pub use driver::{
    DriverState, StreamDriver, StreamOptions, StreamReport, StreamStatus,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_RECORD_FPS,
};
pub use progress::StreamProgress;
pub use sink::{DisplaySink, LastFrame, NullDisplay, StreamEvent};

/// Cooperative stop flag, checked by the driver between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
