//! Face redaction: mosaic transform over detected face regions.
//!
//! The redactor never fails open into an error. Detector trouble degrades to
//! the fallback backend, and if that also produces nothing the frame passes
//! through unmodified.

use image::{imageops, RgbImage};

use crate::detect::{DetectorOutcome, DetectorStack, FaceBox};

pub struct Redactor {
    stack: DetectorStack,
    scale: f32,
}

impl Redactor {
    pub fn new(stack: DetectorStack, scale: f32) -> Self {
        Self { stack, scale }
    }

    /// Mosaic every detected face region. Infallible by contract: an
    /// unavailable detector or zero detections yields the input unchanged.
    pub fn redact(&mut self, image: &RgbImage) -> RgbImage {
        let boxes = match self.stack.detect(image) {
            DetectorOutcome::Detections(boxes) => boxes,
            DetectorOutcome::Unavailable => return image.clone(),
        };
        apply_mosaic(image, &boxes, self.scale)
    }
}

/// Pixelate each box: nearest-neighbor downscale by `scale`, then
/// nearest-neighbor upscale back to the exact region size. Boxes are processed
/// in detection order; later boxes win on overlap.
pub fn apply_mosaic(image: &RgbImage, boxes: &[FaceBox], scale: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();

    for raw_box in boxes {
        let Some(b) = raw_box.clamped(width, height) else {
            continue;
        };
        let (w, h) = (b.width(), b.height());
        let region = imageops::crop_imm(image, b.x1, b.y1, w, h).to_image();

        let small_w = ((w as f32 * scale).round() as u32).max(1);
        let small_h = ((h as f32 * scale).round() as u32).max(1);
        let small = imageops::resize(&region, small_w, small_h, imageops::FilterType::Nearest);
        let mosaic = imageops::resize(&small, w, h, imageops::FilterType::Nearest);

        imageops::replace(&mut out, &mosaic, b.x1 as i64, b.y1 as i64);
    }

    out
}
