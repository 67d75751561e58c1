use anyhow::Result;

use crate::detect::backend::FaceDetector;
use crate::detect::result::{DetectionResult, FaceBox};
use crate::frame::Frame;

/// Replays a fixed sequence of detections, one entry per call, looping at the end.
///
/// Used with `stub://` cameras for demos and for exercising the capture loop
/// without a model.
pub struct ScriptedDetector {
    script: Vec<Vec<FaceBox>>,
    cursor: usize,
    calls: u64,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<FaceBox>>) -> Self {
        Self {
            script,
            cursor: 0,
            calls: 0,
        }
    }

    /// Alternates between an empty frame and one centred face large enough to pass the gate.
    pub fn demo() -> Self {
        Self::new(vec![
            Vec::new(),
            vec![FaceBox::new(240.0, 140.0, 160.0, 180.0)],
        ])
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::demo()
    }
}

impl FaceDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectionResult> {
        self.calls += 1;
        if self.script.is_empty() {
            return Ok(DetectionResult::none());
        }
        let faces = self.script[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.script.len();
        Ok(DetectionResult::from_faces(faces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> Frame {
        Frame::from_rgb(vec![0u8; 4 * 4 * 3], 4, 4).unwrap()
    }

    #[test]
    fn scripted_detector_loops_over_script() {
        let face = FaceBox::new(0.0, 0.0, 100.0, 100.0);
        let mut detector = ScriptedDetector::new(vec![vec![], vec![face], vec![face, face]]);
        let frame = blank();

        assert_eq!(detector.detect(&frame).unwrap().len(), 0);
        assert_eq!(detector.detect(&frame).unwrap().len(), 1);
        assert_eq!(detector.detect(&frame).unwrap().len(), 2);
        assert_eq!(detector.detect(&frame).unwrap().len(), 0);
        assert_eq!(detector.calls(), 4);
    }

    #[test]
    fn empty_script_never_finds_faces() {
        let mut detector = ScriptedDetector::new(Vec::new());
        assert!(detector.detect(&blank()).unwrap().is_empty());
    }
}
