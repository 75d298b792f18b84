#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, FaceBox};

/// Tract-based face detection backend for ONNX models.
///
/// Loads a local model file and performs inference on RGB frames. The model is
/// expected to emit rows of `[x1, y1, x2, y2, confidence, ...]` in model-input
/// coordinates; boxes are scaled back to frame coordinates. No network I/O.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX face model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let resized = if image.dimensions() == (self.width, self.height) {
            image.clone()
        } else {
            imageops::resize(
                image,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            )
        };

        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn extract_boxes(&self, outputs: TVec<Tensor>, frame_w: u32, frame_h: u32) -> Result<Vec<FaceBox>> {
        let output = outputs
            .get(0)
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let flat: Vec<f32> = view.iter().copied().collect();
        if flat.len() % 5 != 0 {
            return Err(anyhow!(
                "unexpected model output layout: {} values",
                flat.len()
            ));
        }

        let sx = frame_w as f32 / self.width as f32;
        let sy = frame_h as f32 / self.height as f32;
        let mut boxes = Vec::new();
        for row in flat.chunks_exact(5) {
            let conf = row[4];
            if conf < self.confidence_threshold {
                continue;
            }
            let x1 = (row[0] * sx).max(0.0) as u32;
            let y1 = (row[1] * sy).max(0.0) as u32;
            let x2 = (row[2] * sx).max(0.0) as u32;
            let y2 = (row[3] * sy).max(0.0) as u32;
            if x2 > x1 && y2 > y1 {
                boxes.push(FaceBox::new(x1, y1, x2, y2));
            }
        }
        Ok(boxes)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceBox>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input))
            .context("ONNX inference failed")?;
        let (frame_w, frame_h) = image.dimensions();
        self.extract_boxes(outputs, frame_w, frame_h)
    }
}
