use crate::detect::{DetectionResult, FaceBox};
use crate::status::KioskStatus;

/// Default minimum face side, in pixels.
pub const DEFAULT_MIN_FACE_PX: u32 = 80;

/// Classification of one tick's detections.
#[derive(Clone, Debug, PartialEq)]
pub enum GateVerdict {
    NoFace,
    MultipleFaces { count: usize },
    TooSmall { face: FaceBox },
    Accepted { face: FaceBox },
}

impl GateVerdict {
    /// Count is checked before size, so a distant lone face gets its own guidance.
    pub fn classify(result: &DetectionResult, min_face_px: u32) -> Self {
        match result.faces.as_slice() {
            [] => GateVerdict::NoFace,
            [face] if face.meets_min_side(min_face_px as f32) => {
                GateVerdict::Accepted { face: *face }
            }
            [face] => GateVerdict::TooSmall { face: *face },
            faces => GateVerdict::MultipleFaces { count: faces.len() },
        }
    }

    pub fn proceeds(&self) -> bool {
        matches!(self, GateVerdict::Accepted { .. })
    }

    pub fn status(&self) -> KioskStatus {
        match self {
            GateVerdict::NoFace => KioskStatus::AwaitingFace,
            GateVerdict::MultipleFaces { count } => KioskStatus::MultipleFaces { count: *count },
            GateVerdict::TooSmall { .. } => KioskStatus::MoveCloser,
            GateVerdict::Accepted { .. } => KioskStatus::Verifying,
        }
    }
}
