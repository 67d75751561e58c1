//! Captured video frames.
//!
//! - `Frame`: RGB8 pixels of a single camera sample, zeroized on drop.
//! - JPEG helpers used by camera sources (decode) and capture (encode).
//!
//! Frames carry biometric content. They are handed to the detector, encoded once
//! for submission when the gate passes, and dropped at the end of the tick.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GenericImageView};
use std::time::Instant;
use zeroize::Zeroize;

/// Default JPEG quality for captured stills.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Largest JPEG accepted from a camera source.
pub const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// A single RGB8 frame. There is no `Clone`; the pixel buffer has one owner.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    captured_at: Instant,
}

impl Frame {
    /// Wrap an RGB8 buffer. The length must be `width * height * 3`.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        })
    }

    /// Decode a JPEG (or any format enabled in `image`) into an RGB8 frame.
    pub fn from_jpeg(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_JPEG_BYTES {
            return Err(anyhow!("jpeg of {} bytes exceeds limit", bytes.len()));
        }
        let image = image::load_from_memory(bytes).context("decode jpeg")?;
        let (width, height) = image.dimensions();
        Self::from_rgb(image.into_rgb8().into_raw(), width, height)
    }

    /// Read-only pixel access for detectors.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Monotonic capture instant.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Rasterize the frame into a JPEG still.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        if !(1..=100).contains(&quality) {
            return Err(anyhow!("jpeg quality must be within 1..=100, got {}", quality));
        }
        let mut out = Vec::with_capacity(self.data.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .context("encode jpeg")?;
        Ok(out)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is never printed.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}
