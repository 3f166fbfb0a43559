//! Local video file source.
//!
//! `stub://` paths produce a finite synthetic clip; anything else is decoded
//! with FFmpeg when the `ingest-file-ffmpeg` feature is enabled. Remote URLs
//! are rejected.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::SyntheticSource;
use super::{is_stub, FrameSource, SourceInfo};
use crate::frame::Frame;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "clips/street.mp4") or `stub://name`.
    pub path: String,
    /// Length of a `stub://` clip.
    pub stub_frames: u64,
    /// Geometry of a `stub://` clip.
    pub stub_width: u32,
    pub stub_height: u32,
    pub stub_fps: f64,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            stub_frames: 60,
            stub_width: 640,
            stub_height: 480,
            stub_fps: 20.0,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): '{}'",
                config.path
            ));
        }
        if is_stub(&config.path) {
            let clip = SyntheticSource::new(config.stub_width, config.stub_height, config.stub_fps)
                .with_frame_limit(config.stub_frames)
                .with_origin(config.path.clone());
            Ok(Self {
                backend: FileBackend::Synthetic(clip),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "video file decoding requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn info(&self) -> SourceInfo {
        match &self.backend {
            FileBackend::Synthetic(source) => source.info(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.info(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_stub(path) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_clip_is_finite_and_reports_its_length() -> Result<()> {
        let mut source = FileSource::new(FileConfig {
            stub_frames: 4,
            stub_width: 32,
            stub_height: 24,
            ..FileConfig::new("stub://clip")
        })?;
        source.connect()?;
        let info = source.info();
        assert_eq!(info.frame_count, Some(4));
        assert_eq!(info.origin, "stub://clip");

        let mut pulled = 0;
        while let Some(frame) = source.next_frame()? {
            assert_eq!((frame.width(), frame.height()), (32, 24));
            pulled += 1;
        }
        assert_eq!(pulled, 4);
        Ok(())
    }

    #[test]
    fn remote_urls_are_rejected() {
        assert!(FileSource::new(FileConfig::new("rtsp://camera/stream")).is_err());
        assert!(FileSource::new(FileConfig::new("  ")).is_err());
    }
}
