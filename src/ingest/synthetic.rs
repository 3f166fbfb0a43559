use anyhow::Result;

use super::{FrameSource, SourceInfo};
use crate::frame::Frame;

/// Generated frames: a gradient background with a bright square drifting
/// across it, so consecutive frames differ.
pub struct SyntheticSource {
    origin: String,
    width: u32,
    height: u32,
    fps: f64,
    limit: Option<u64>,
    produced: u64,
}

impl SyntheticSource {
    /// Endless source, like a camera.
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            origin: "stub://synthetic".to_string(),
            width,
            height,
            fps,
            limit: None,
            produced: 0,
        }
    }

    /// Stop after `frames`, like a file.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn render(&self) -> Result<Frame> {
        let (w, h) = (self.width as usize, self.height as usize);
        let side = (w.min(h) / 4).max(1);
        let travel = w.saturating_sub(side).max(1);
        let square_x = (self.produced as usize * 4) % travel;
        let square_y = h.saturating_sub(side) / 2;

        let mut data = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let at = (y * w + x) * 3;
                let inside = x >= square_x
                    && x < square_x + side
                    && y >= square_y
                    && y < square_y + side;
                if inside {
                    data[at..at + 3].copy_from_slice(&[240, 240, 240]);
                } else {
                    data[at] = (x * 255 / w.max(1)) as u8;
                    data[at + 1] = (y * 255 / h.max(1)) as u8;
                    data[at + 2] = 96;
                }
            }
        }
        Frame::rgb(data, self.width, self.height)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.origin);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }
        let frame = self.render()?;
        self.produced += 1;
        Ok(Some(frame))
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            origin: self.origin.clone(),
            width: self.width,
            height: self.height,
            fps: Some(self.fps),
            frame_count: self.limit,
        }
    }
}
