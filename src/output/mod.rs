//! Writing annotated results to disk.
//!
//! Output naming follows the input: `street.jpg` becomes
//! `street_processed.png`, `clip.mov` becomes `clip_processed.<ext>`, and
//! webcam recordings are stamped with the local start time.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::frame::Frame;
use crate::record::{RecordingSpec, VideoSink, VideoSinkFactory};

#[cfg(feature = "encode-ffmpeg")]
pub mod ffmpeg;
pub mod y4m;

#[cfg(feature = "encode-ffmpeg")]
pub use ffmpeg::FfmpegMp4Writer;
pub use y4m::Y4mWriter;

pub const PROCESSED_SUFFIX: &str = "_processed";

/// Container and codec used for recorded video.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// Uncompressed YUV4MPEG2. Always available.
    Y4m,
    /// MPEG-4 in an MP4 container. Needs the `encode-ffmpeg` feature.
    Mp4,
}

impl VideoFormat {
    /// MP4 when the build can encode it, otherwise Y4M.
    pub fn preferred() -> Self {
        if cfg!(feature = "encode-ffmpeg") {
            VideoFormat::Mp4
        } else {
            VideoFormat::Y4m
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            VideoFormat::Y4m => "y4m",
            VideoFormat::Mp4 => "mp4",
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            VideoFormat::Y4m => true,
            VideoFormat::Mp4 => cfg!(feature = "encode-ffmpeg"),
        }
    }

    /// Open a writer for `path`.
    pub fn create(self, path: &Path, spec: RecordingSpec) -> Result<Box<dyn VideoSink>> {
        match self {
            VideoFormat::Y4m => Ok(Box::new(Y4mWriter::create(path, spec)?)),
            #[cfg(feature = "encode-ffmpeg")]
            VideoFormat::Mp4 => Ok(Box::new(FfmpegMp4Writer::create(path, spec)?)),
            #[cfg(not(feature = "encode-ffmpeg"))]
            VideoFormat::Mp4 => anyhow::bail!(
                "mp4 output requires the encode-ffmpeg feature; use y4m instead"
            ),
        }
    }
}

impl std::str::FromStr for VideoFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "y4m" => Ok(VideoFormat::Y4m),
            "mp4" => Ok(VideoFormat::Mp4),
            other => anyhow::bail!("unknown video format '{}' (expected y4m or mp4)", other),
        }
    }
}

/// `dir/{stem}_processed.png`
pub fn processed_image_path(input: &Path, dir: &Path) -> PathBuf {
    dir.join(format!("{}{}.png", file_stem(input), PROCESSED_SUFFIX))
}

/// `dir/{stem}_processed.{ext}`
pub fn processed_video_path(input: &Path, dir: &Path, format: VideoFormat) -> PathBuf {
    dir.join(format!(
        "{}{}.{}",
        file_stem(input),
        PROCESSED_SUFFIX,
        format.extension()
    ))
}

/// `dir/recording_%Y%m%d_%H%M%S.{ext}`
pub fn recording_path(dir: &Path, started: DateTime<Local>, format: VideoFormat) -> PathBuf {
    dir.join(format!(
        "recording_{}.{}",
        started.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "output".to_string())
}

/// Encode a frame as PNG (or whatever the extension names).
pub fn save_image(frame: &Frame, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    frame
        .to_rgb_image()?
        .save(path)
        .with_context(|| format!("failed to write image {}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display())),
        _ => Ok(()),
    }
}

/// Writes one processed video to a fixed path. Every session overwrites it.
pub struct FixedPathSinks {
    path: PathBuf,
    format: VideoFormat,
}

impl FixedPathSinks {
    pub fn new(path: PathBuf, format: VideoFormat) -> Self {
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSinkFactory for FixedPathSinks {
    fn open(&mut self, spec: &RecordingSpec) -> Result<Box<dyn VideoSink>> {
        ensure_parent(&self.path)?;
        self.format.create(&self.path, *spec)
    }
}

/// New timestamped file per session under one directory.
pub struct TimestampedSinks {
    dir: PathBuf,
    format: VideoFormat,
}

impl TimestampedSinks {
    pub fn new(dir: PathBuf, format: VideoFormat) -> Self {
        Self { dir, format }
    }
}

impl VideoSinkFactory for TimestampedSinks {
    fn open(&mut self, spec: &RecordingSpec) -> Result<Box<dyn VideoSink>> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create directory {}", self.dir.display()))?;
        let first = recording_path(&self.dir, Local::now(), self.format);
        let base = file_stem(&first);
        let mut path = first;
        // Two sessions inside the same second must not clobber each other.
        let mut n = 1;
        while path.exists() {
            path = self
                .dir
                .join(format!("{}-{}.{}", base, n, self.format.extension()));
            n += 1;
        }
        self.format.create(&path, *spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn processed_names_follow_the_input() {
        let dir = Path::new("out");
        assert_eq!(
            processed_image_path(Path::new("/data/street.jpg"), dir),
            PathBuf::from("out/street_processed.png")
        );
        assert_eq!(
            processed_video_path(Path::new("clip.mov"), dir, VideoFormat::Y4m),
            PathBuf::from("out/clip_processed.y4m")
        );
        assert_eq!(
            processed_image_path(Path::new(""), dir),
            PathBuf::from("out/output_processed.png")
        );
    }

    #[test]
    fn recording_names_carry_the_start_time() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            recording_path(Path::new("rec"), started, VideoFormat::Mp4),
            PathBuf::from("rec/recording_20240309_070501.mp4")
        );
    }

    #[test]
    fn format_parsing() {
        assert_eq!("MP4".parse::<VideoFormat>().unwrap(), VideoFormat::Mp4);
        assert_eq!(" y4m ".parse::<VideoFormat>().unwrap(), VideoFormat::Y4m);
        assert!("avi".parse::<VideoFormat>().is_err());
        assert!(VideoFormat::Y4m.is_available());
    }
}
