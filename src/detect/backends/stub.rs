use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::{DetectorBackend, FaceBox};

/// Stub backend for testing. Returns a fixed set of boxes for every frame.
pub struct StubBackend {
    boxes: Vec<FaceBox>,
}

impl StubBackend {
    pub fn new(boxes: Vec<FaceBox>) -> Self {
        Self { boxes }
    }

    /// A stub that never detects anything.
    pub fn empty() -> Self {
        Self { boxes: Vec::new() }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::empty()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<FaceBox>> {
        Ok(self.boxes.clone())
    }
}
