use anyhow::Result;
use image::RgbImage;

/// Axis-aligned face box in pixel coordinates, end-exclusive.
///
/// Boxes may extend past the image edge; consumers clamp before use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl FaceBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Clamp to image bounds. Returns None for degenerate regions.
    pub fn clamped(&self, width: u32, height: u32) -> Option<FaceBox> {
        let x1 = self.x1.min(width);
        let y1 = self.y1.min(height);
        let x2 = self.x2.min(width);
        let y2 = self.y2.min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(FaceBox { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

/// Face detector backend trait.
///
/// Implementations must treat the image as read-only and ephemeral: no pixel
/// retention beyond the `detect` call, no disk writes, no network I/O.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run face detection on a frame. An error means the backend is unable to
    /// produce a verdict (model missing, inference failure); it is not a
    /// statement about the image.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceBox>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_cuts_boxes_to_image_bounds() {
        let b = FaceBox::new(10, 10, 100, 100).clamped(64, 48).unwrap();
        assert_eq!(b, FaceBox::new(10, 10, 64, 48));
    }

    #[test]
    fn clamp_rejects_degenerate_boxes() {
        assert!(FaceBox::new(70, 10, 100, 20).clamped(64, 48).is_none());
        assert!(FaceBox::new(5, 5, 5, 20).clamped(64, 48).is_none());
    }
}
