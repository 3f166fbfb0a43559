use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceInfo};
use crate::frame::Frame;

/// A still image as a one-frame source.
pub struct ImageSource {
    path: PathBuf,
    frame: Option<Frame>,
    width: u32,
    height: u32,
}

impl ImageSource {
    /// Decode `path` eagerly. Any format the `image` crate was built with
    /// works; alpha and grayscale are converted to RGB.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        let frame = Frame::from_rgb_image(decoded.into_rgb8());
        log::info!(
            "ImageSource: loaded {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self::from_frame(path, frame))
    }

    pub fn from_frame<P: AsRef<Path>>(path: P, frame: Frame) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            width: frame.width(),
            height: frame.height(),
            frame: Some(frame),
        }
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frame.take())
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            origin: self.path.display().to_string(),
            width: self.width,
            height: self.height,
            fps: None,
            frame_count: Some(1),
        }
    }
}
