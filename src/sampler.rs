//! Per-frame color averaging
//!
//! Reduces a raw camera buffer to the mean red, green and blue intensity over
//! a sparse grid of pixels. Runs on the capture thread, so it holds no state.

use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Sample every `stride`-th pixel along both axes
    #[serde(default = "default_stride")]
    pub stride: usize,
}

fn default_stride() -> usize {
    10
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            stride: default_stride(),
        }
    }
}

/// Byte order of a 4-byte pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    /// Blue, green, red, alpha (the usual camera capture format)
    #[default]
    Bgra,
    Rgba,
}

impl PixelLayout {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Offsets of the (red, green, blue) bytes within a pixel
    fn channel_offsets(&self) -> (usize, usize, usize) {
        match self {
            PixelLayout::Bgra => (2, 1, 0),
            PixelLayout::Rgba => (0, 1, 2),
        }
    }
}

/// Borrowed view of one captured frame
///
/// `bytes_per_row` may be larger than `width * 4` when the capture device pads
/// rows.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub bytes_per_row: usize,
    pub layout: PixelLayout,
}

impl<'a> RawFrame<'a> {
    /// Tightly packed frame with no row padding
    pub fn packed(data: &'a [u8], width: usize, height: usize, layout: PixelLayout) -> Self {
        Self {
            data,
            width,
            height,
            bytes_per_row: width * PixelLayout::BYTES_PER_PIXEL,
            layout,
        }
    }
}

/// Channel means of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub avg_r: f64,
    pub avg_g: f64,
    pub avg_b: f64,
    pub timestamp: Instant,
}

impl FrameSample {
    pub fn new(avg_r: f64, avg_g: f64, avg_b: f64, timestamp: Instant) -> Self {
        Self {
            avg_r,
            avg_g,
            avg_b,
            timestamp,
        }
    }
}

/// Average the channels of every `stride`-th pixel of every `stride`-th row.
///
/// Pixels that would fall outside `frame.data` are skipped. A frame with no
/// readable pixels yields an all-zero sample.
pub fn sample_frame(frame: &RawFrame<'_>, stride: usize, timestamp: Instant) -> FrameSample {
    let stride = stride.max(1);
    let (r_off, g_off, b_off) = frame.layout.channel_offsets();

    let mut r_total = 0u64;
    let mut g_total = 0u64;
    let mut b_total = 0u64;
    let mut count = 0u64;

    for y in (0..frame.height).step_by(stride) {
        let Some(row_start) = y.checked_mul(frame.bytes_per_row) else {
            break;
        };

        for x in (0..frame.width).step_by(stride) {
            let Some(start) = x
                .checked_mul(PixelLayout::BYTES_PER_PIXEL)
                .and_then(|offset| row_start.checked_add(offset))
            else {
                break;
            };
            let Some(pixel) = start
                .checked_add(PixelLayout::BYTES_PER_PIXEL)
                .and_then(|end| frame.data.get(start..end))
            else {
                break;
            };

            r_total += u64::from(pixel[r_off]);
            g_total += u64::from(pixel[g_off]);
            b_total += u64::from(pixel[b_off]);
            count += 1;
        }
    }

    if count == 0 {
        return FrameSample::new(0.0, 0.0, 0.0, timestamp);
    }

    let denom = count as f64;
    FrameSample::new(
        r_total as f64 / denom,
        g_total as f64 / denom,
        b_total as f64 / denom,
        timestamp,
    )
}
