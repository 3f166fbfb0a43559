//! MP4 recording through FFmpeg (MPEG-4 Part 2 video).

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;

use super::y4m::{frame_rate_ratio, rgb_to_ycbcr};
use crate::frame::Frame;
use crate::record::{RecordingSpec, VideoSink};

pub struct FfmpegMp4Writer {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    spec: RecordingSpec,
    destination: String,
    next_pts: i64,
}

impl FfmpegMp4Writer {
    pub fn create(path: &Path, spec: RecordingSpec) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to open {} for writing", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg build has no MPEG-4 encoder"))?;
        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();

        let (num, den) = frame_rate_ratio(spec.fps);
        let (num, den) = (num as i32, den as i32);
        let encoder_time_base = ffmpeg::Rational::new(den, num);

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        encoder.set_width(spec.width);
        encoder.set_height(spec.height);
        encoder.set_format(ffmpeg::format::Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(num, den)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open MPEG-4 encoder")?;
        stream.set_parameters(&encoder);

        output.write_header().context("write container header")?;

        Ok(Self {
            output,
            encoder,
            stream_index,
            encoder_time_base,
            spec,
            destination: path.display().to_string(),
            next_pts: 0,
        })
    }

    fn drain_packets(&mut self) -> Result<()> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .ok_or_else(|| anyhow!("output stream disappeared"))?
            .time_base();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl VideoSink for FfmpegMp4Writer {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.spec.width
            || frame.height() != self.spec.height
            || !frame.is_rgb()
        {
            anyhow::bail!(
                "mp4 stream expects {}x{}x3 frames, got {}",
                self.spec.width,
                self.spec.height,
                frame.shape()
            );
        }
        let mut yuv = ffmpeg::frame::Video::new(
            ffmpeg::format::Pixel::YUV420P,
            self.spec.width,
            self.spec.height,
        );
        fill_yuv420p(frame, &mut yuv);
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv)
            .context("send frame to encoder")?;
        self.drain_packets()
    }

    fn finish(&mut self) -> Result<()> {
        self.encoder.send_eof().context("flush encoder")?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .context("write container trailer")
    }

    fn destination(&self) -> String {
        self.destination.clone()
    }
}

/// Full-resolution luma, chroma averaged over 2x2 blocks.
fn fill_yuv420p(frame: &Frame, yuv: &mut ffmpeg::frame::Video) {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let rgb = frame.as_bytes();
    let pixel = |x: usize, y: usize| {
        let at = (y * width + x) * 3;
        rgb_to_ycbcr([rgb[at], rgb[at + 1], rgb[at + 2]])
    };

    let y_stride = yuv.stride(0);
    let luma = yuv.data_mut(0);
    for y in 0..height {
        for x in 0..width {
            luma[y * y_stride + x] = pixel(x, y)[0];
        }
    }

    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);
    let mut cb = vec![0u8; chroma_w * chroma_h];
    let mut cr = vec![0u8; chroma_w * chroma_h];
    for cy in 0..chroma_h {
        for cx in 0..chroma_w {
            let (mut sum_u, mut sum_v, mut n) = (0u32, 0u32, 0u32);
            for y in (cy * 2)..((cy * 2 + 2).min(height)) {
                for x in (cx * 2)..((cx * 2 + 2).min(width)) {
                    let [_, u, v] = pixel(x, y);
                    sum_u += u as u32;
                    sum_v += v as u32;
                    n += 1;
                }
            }
            cb[cy * chroma_w + cx] = ((sum_u + n / 2) / n) as u8;
            cr[cy * chroma_w + cx] = ((sum_v + n / 2) / n) as u8;
        }
    }
    for (plane, values) in [(1, &cb), (2, &cr)] {
        let stride = yuv.stride(plane);
        let data = yuv.data_mut(plane);
        for row in 0..chroma_h {
            data[row * stride..row * stride + chroma_w]
                .copy_from_slice(&values[row * chroma_w..(row + 1) * chroma_w]);
        }
    }
}
