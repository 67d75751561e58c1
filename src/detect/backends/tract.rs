#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::{resize, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::FaceDetector;
use crate::detect::result::{DetectionResult, FaceBox};
use crate::frame::Frame;

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;
const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

type Plan = TypedRunnableModel<TypedModel>;

/// ONNX face detector for UltraFace-style models (`1x3x240x320` input,
/// `scores [1,N,2]` and normalized corner `boxes [1,N,4]` outputs).
///
/// The model is loaded from a local path in `warm_up`; inference never touches
/// the network or disk.
pub struct TractFaceDetector {
    model_path: PathBuf,
    model: Option<Plan>,
    score_threshold: f32,
    iou_threshold: f32,
}

impl TractFaceDetector {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }

    fn load(&self) -> Result<Plan> {
        let path = &self.model_path;
        tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let scaled = resize(&image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize),
            |(_, channel, y, x)| {
                let px = scaled.get_pixel(x as u32, y as u32);
                (px[channel] as f32 - 127.0) / 128.0
            },
        );
        Ok(input.into_tensor())
    }

    fn extract_faces(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<FaceBox>> {
        if outputs.len() < 2 {
            return Err(anyhow!("model produced {} outputs, expected 2", outputs.len()));
        }
        let scores = outputs[0]
            .to_array_view::<f32>()
            .context("scores tensor was not f32")?;
        let boxes = outputs[1]
            .to_array_view::<f32>()
            .context("boxes tensor was not f32")?;
        let score_rows = scores.len() / 2;
        let box_rows = boxes.len() / 4;
        let scores = scores
            .into_shape((score_rows, 2))
            .context("unexpected scores shape")?;
        let boxes = boxes
            .into_shape((box_rows, 4))
            .context("unexpected boxes shape")?;

        let fw = frame.width as f32;
        let fh = frame.height as f32;
        let mut candidates: Vec<(f32, FaceBox)> = scores
            .outer_iter()
            .zip(boxes.outer_iter())
            .filter(|(score, _)| score[1] >= self.score_threshold)
            .map(|(score, corners)| {
                let x1 = corners[0].clamp(0.0, 1.0) * fw;
                let y1 = corners[1].clamp(0.0, 1.0) * fh;
                let x2 = corners[2].clamp(0.0, 1.0) * fw;
                let y2 = corners[3].clamp(0.0, 1.0) * fh;
                (score[1], FaceBox::new(x1, y1, x2 - x1, y2 - y1))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut kept: Vec<FaceBox> = Vec::new();
        for (_, candidate) in candidates {
            if kept
                .iter()
                .all(|existing| existing.iou(&candidate) < self.iou_threshold)
            {
                kept.push(candidate);
            }
        }
        Ok(kept)
    }
}

impl FaceDetector for TractFaceDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn warm_up(&mut self) -> Result<()> {
        if self.model.is_none() {
            self.model = Some(self.load()?);
        }
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let input = self.build_input(frame)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract detector used before warm_up"))?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let faces = self.extract_faces(outputs, frame)?;
        Ok(DetectionResult::from_faces(faces))
    }
}
