use std::time::{Duration, Instant};

/// Per-stream progress, recomputed on every frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamProgress {
    /// Frames pulled so far.
    pub current: u64,
    /// Total frames, when the source knows it.
    pub total: Option<u64>,
    /// Rate from the wall-clock gap between the last two frames.
    pub fps: Option<f64>,
    last_frame_at: Option<Instant>,
}

impl StreamProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            // A zero total says nothing useful about progress.
            total: total.filter(|t| *t > 0),
            ..Self::default()
        }
    }

    /// A frame became available at `now`.
    pub fn record_frame_at(&mut self, now: Instant) {
        self.current += 1;
        if let Some(previous) = self.last_frame_at {
            let gap = now.saturating_duration_since(previous);
            self.fps = rate_for_gap(gap);
        }
        self.last_frame_at = Some(now);
    }

    pub fn record_frame(&mut self) {
        self.record_frame_at(Instant::now());
    }

    /// `current / total` in [0, 1]; `None` for live sources.
    pub fn fraction(&self) -> Option<f64> {
        self.total
            .map(|total| (self.current as f64 / total as f64).min(1.0))
    }
}

fn rate_for_gap(gap: Duration) -> Option<f64> {
    let secs = gap.as_secs_f64();
    (secs > 0.0).then(|| 1.0 / secs)
}

impl std::fmt::Display for StreamProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.total {
            Some(total) => write!(f, "frame {}/{}", self.current, total)?,
            None => write!(f, "frame {}", self.current)?,
        }
        if let Some(fps) = self.fps {
            write!(f, " | FPS: {:.1}", fps)?;
        }
        Ok(())
    }
}
