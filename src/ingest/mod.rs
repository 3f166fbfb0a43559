//! Frame ingestion sources.
//!
//! Every source yields RGB frames one at a time through [`FrameSource`]:
//! - Still images (one-frame source)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//! - `stub://` synthetic sources (testing, demos)
//!
//! A source signals exhaustion with `Ok(None)`. An `Err` means the source is
//! unusable and the stream stops.

use anyhow::Result;
use std::fmt;

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod image;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;

pub use camera::{CameraConfig, CameraSource};
pub use file::{FileConfig, FileSource};
pub use image::ImageSource;
pub use synthetic::SyntheticSource;

use crate::frame::Frame;

/// A pull-based frame source, exclusively owned by one stream.
pub trait FrameSource {
    /// Open the underlying device or file. Sources that need no setup keep
    /// the default.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Geometry, rate and length. Live sources report no frame count.
    fn info(&self) -> SourceInfo;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn info(&self) -> SourceInfo {
        (**self).info()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    /// Path, device or URL, for logs.
    pub origin: String,
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate, when the source knows it.
    pub fps: Option<f64>,
    /// Total frames, when known up front.
    pub frame_count: Option<u64>,
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{}", self.origin, self.width, self.height)?;
        if let Some(fps) = self.fps {
            write!(f, " @ {:.2} fps", fps)?;
        }
        if let Some(count) = self.frame_count {
            write!(f, ", {} frames", count)?;
        }
        write!(f, ")")
    }
}

/// `stub://` paths select the synthetic backend of a source.
pub(crate) fn is_stub(path: &str) -> bool {
    path.starts_with("stub://")
}
