//! Camera sources.
//!
//! - `stub://<name>`: synthetic frames (tests, demos)
//! - `http(s)://...`: MJPEG stream or JPEG snapshot endpoint
//!
//! `connect` is called once at startup. A connect failure is the camera
//! acquisition failure and is fatal to the feed; per-frame read failures are
//! recoverable and only cost the current tick.
//!
//! Sources MUST NOT store frames to disk or forward them anywhere; the capture
//! stage is the single path by which a still leaves the process.

mod http;
mod synthetic;

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use crate::frame::Frame;
use http::HttpCamera;
use synthetic::SyntheticCamera;

/// Source of live frames for the sampler.
pub trait FrameSource: Send {
    /// Acquire the device. Called once before the first tick.
    fn connect(&mut self) -> Result<()>;

    /// Current frame of the live feed.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub url: String,
    /// Frame size for synthetic sources.
    pub width: u32,
    pub height: u32,
    pub connect_timeout: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://kiosk_camera".to_string(),
            width: 640,
            height: 480,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Camera selected by URL scheme.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    Http(HttpCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(
                    config.url,
                    config.width,
                    config.height,
                )),
            });
        }
        let url = Url::parse(&config.url).context("parse camera url")?;
        match url.scheme() {
            "http" | "https" => Ok(Self {
                backend: CameraBackend::Http(HttpCamera::new(config.url, config.connect_timeout)),
            }),
            other => Err(anyhow!(
                "unsupported camera scheme '{}'; expected stub or http(s)",
                other
            )),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            CameraBackend::Http(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            CameraBackend::Http(source) => source.stats(),
        }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            CameraBackend::Http(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            CameraBackend::Http(source) => source.next_frame(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_camera_produces_configured_frames() {
        let mut camera = CameraSource::new(CameraConfig {
            url: "stub://test".to_string(),
            width: 32,
            height: 24,
            ..CameraConfig::default()
        })
        .unwrap();
        camera.connect().unwrap();

        let frame = camera.next_frame().unwrap();
        assert_eq!((frame.width, frame.height), (32, 24));
        assert_eq!(frame.pixels().len(), 32 * 24 * 3);
        assert!(camera.is_healthy());
        assert_eq!(camera.stats().frames_captured, 1);
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = CameraSource::new(CameraConfig {
            url: "rtsp://camera/stream".to_string(),
            ..CameraConfig::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("rtsp"));
    }

    #[test]
    fn http_camera_is_unhealthy_before_connect() {
        let camera = CameraSource::new(CameraConfig {
            url: "http://127.0.0.1:9/snapshot.jpg".to_string(),
            ..CameraConfig::default()
        })
        .unwrap();
        assert!(!camera.is_healthy());
    }
}
