//! Frame container shared by sources, detectors, the annotator and sinks.
//!
//! A `Frame` owns an interleaved 8-bit pixel grid. Pipeline stages expect
//! three-channel RGB; other channel counts can be represented so that a
//! misbehaving source surfaces as a detection error instead of a panic.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::fmt;

/// Channel count of the RGB frames the pipeline works on.
pub const RGB_CHANNELS: u8 = 3;

/// Width, height and channel count of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl FrameShape {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of bytes a frame of this shape occupies, if it fits in memory.
    pub fn byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(self.channels as usize))
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// An owned, interleaved pixel grid.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    shape: FrameShape,
}

impl Frame {
    /// Build a frame from raw bytes. The buffer length must match the shape.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self> {
        let shape = FrameShape {
            width,
            height,
            channels,
        };
        let expected = shape
            .byte_len()
            .ok_or_else(|| anyhow!("frame dimensions overflow ({})", shape))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch for {}: expected {}, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { data, shape })
    }

    /// Build an RGB frame from raw bytes.
    pub fn rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Self::new(data, width, height, RGB_CHANNELS)
    }

    /// A frame filled with a single RGB color.
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&color);
        }
        Self {
            data,
            shape: FrameShape {
                width,
                height,
                channels: RGB_CHANNELS,
            },
        }
    }

    pub fn width(&self) -> u32 {
        self.shape.width
    }

    pub fn height(&self) -> u32 {
        self.shape.height
    }

    pub fn channels(&self) -> u8 {
        self.shape.channels
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn is_rgb(&self) -> bool {
        self.shape.channels == RGB_CHANNELS
    }

    /// Copy the frame into an `image` buffer. Fails for non-RGB frames.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        if !self.is_rgb() {
            return Err(anyhow!("frame {} is not 3-channel RGB", self.shape));
        }
        RgbImage::from_raw(self.shape.width, self.shape.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}", self.shape))
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            shape: FrameShape {
                width,
                height,
                channels: RGB_CHANNELS,
            },
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("shape", &format_args!("{}", self.shape))
            .finish()
    }
}
