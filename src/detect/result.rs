use serde::{Deserialize, Serialize};

/// Bounding box of a detected face, in frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when both sides reach `min_side` pixels.
    pub fn meets_min_side(&self, min_side: f32) -> bool {
        self.width >= min_side && self.height >= min_side
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Faces found in one sampled frame. Discarded after the tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub faces: Vec<FaceBox>,
}

impl DetectionResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_faces(faces: Vec<FaceBox>) -> Self {
        Self { faces }
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_side_requires_both_dimensions() {
        assert!(FaceBox::new(0.0, 0.0, 80.0, 80.0).meets_min_side(80.0));
        assert!(!FaceBox::new(0.0, 0.0, 79.9, 200.0).meets_min_side(80.0));
        assert!(!FaceBox::new(0.0, 0.0, 200.0, 40.0).meets_min_side(80.0));
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = FaceBox::new(0.0, 0.0, 10.0, 10.0);
        let b = FaceBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
    }
}
