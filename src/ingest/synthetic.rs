use anyhow::Result;

use super::CameraStats;
use crate::frame::Frame;

/// Synthetic camera for `stub://` URLs. Produces a slowly shifting gradient.
pub(crate) struct SyntheticCamera {
    url: String,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticCamera {
    pub(crate) fn new(url: String, width: u32, height: u32) -> Self {
        Self {
            url,
            width,
            height,
            frame_count: 0,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        log::info!("camera: connected to {} (synthetic)", self.url);
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let shift = (self.frame_count % 256) as u32;
        let mut pixels = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push(((x + shift) % 256) as u8);
                pixels.push(((y + shift) % 256) as u8);
                pixels.push(((x + y) % 256) as u8);
            }
        }
        Frame::from_rgb(pixels, self.width, self.height)
    }

    pub(crate) fn is_healthy(&self) -> bool {
        true
    }

    pub(crate) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            source: self.url.clone(),
        }
    }
}
