//! YUV4MPEG2 writer.
//!
//! Uncompressed 4:4:4 frames behind a one-line text header. Every mainstream
//! player and FFmpeg read it, and it needs no codec library.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::frame::Frame;
use crate::record::{RecordingSpec, VideoSink};

pub struct Y4mWriter<W: Write + Send> {
    out: W,
    spec: RecordingSpec,
    destination: String,
    planes: Vec<u8>,
}

impl Y4mWriter<BufWriter<File>> {
    pub fn create(path: &Path, spec: RecordingSpec) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create video file {}", path.display()))?;
        Self::new(BufWriter::new(file), spec, path.display().to_string())
    }
}

impl<W: Write + Send> Y4mWriter<W> {
    /// Writes the stream header immediately.
    pub fn new(mut out: W, spec: RecordingSpec, destination: String) -> Result<Self> {
        let (num, den) = frame_rate_ratio(spec.fps);
        writeln!(
            out,
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C444",
            spec.width, spec.height, num, den
        )
        .context("write y4m header")?;
        Ok(Self {
            out,
            spec,
            destination,
            planes: Vec::new(),
        })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> VideoSink for Y4mWriter<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.spec.width
            || frame.height() != self.spec.height
            || !frame.is_rgb()
        {
            anyhow::bail!(
                "y4m stream expects {}x{}x3 frames, got {}",
                self.spec.width,
                self.spec.height,
                frame.shape()
            );
        }
        rgb_to_yuv444(frame.as_bytes(), &mut self.planes);
        self.out.write_all(b"FRAME\n").context("write y4m frame")?;
        self.out.write_all(&self.planes).context("write y4m frame")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().context("flush y4m stream")
    }

    fn destination(&self) -> String {
        self.destination.clone()
    }
}

/// Express a frame rate as an integer ratio, millihertz precision.
pub(crate) fn frame_rate_ratio(fps: f64) -> (u64, u64) {
    if fps.fract() == 0.0 {
        return (fps as u64, 1);
    }
    ((fps * 1000.0).round() as u64, 1000)
}

/// BT.601 limited-range conversion into planar Y, Cb, Cr.
fn rgb_to_yuv444(rgb: &[u8], planes: &mut Vec<u8>) {
    let pixels = rgb.len() / 3;
    planes.clear();
    planes.resize(pixels * 3, 0);
    let (y_plane, chroma) = planes.split_at_mut(pixels);
    let (u_plane, v_plane) = chroma.split_at_mut(pixels);
    for (i, px) in rgb.chunks_exact(3).enumerate() {
        let [y, u, v] = rgb_to_ycbcr([px[0], px[1], px[2]]);
        y_plane[i] = y;
        u_plane[i] = u;
        v_plane[i] = v;
    }
}

/// One pixel, BT.601 limited range.
pub(crate) fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 16.0 + (65.481 * r + 128.553 * g + 24.966 * b) / 255.0;
    let u = 128.0 + (-37.797 * r - 74.203 * g + 112.0 * b) / 255.0;
    let v = 128.0 + (112.0 * r - 93.786 * g - 18.214 * b) / 255.0;
    [
        y.round().clamp(0.0, 255.0) as u8,
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    ]
}
