use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Face detector backend.
///
/// Backends receive a borrowed frame for the duration of `detect` only and
/// return bounding boxes. They must not retain pixels, write them to disk or
/// send them over the network; the capture stage owns submission.
pub trait FaceDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Model-load step, run once before the first tick.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Find faces in a frame.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult>;
}
