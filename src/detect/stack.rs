use image::RgbImage;

use super::backend::{DetectorBackend, FaceBox};

/// Tagged result of a two-stage detection attempt.
///
/// `Unavailable` means neither backend could produce a verdict; the caller
/// chooses what to do with the frame (the redactor passes it through).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorOutcome {
    Detections(Vec<FaceBox>),
    Unavailable,
}

/// Primary detector with a lower-accuracy fallback.
///
/// The primary is optional: deployments without a model run on the fallback
/// alone. A primary failure is logged once per frame and demotes that frame to
/// the fallback; it never propagates to the caller.
pub struct DetectorStack {
    primary: Option<Box<dyn DetectorBackend>>,
    fallback: Box<dyn DetectorBackend>,
}

impl DetectorStack {
    pub fn new(
        primary: Option<Box<dyn DetectorBackend>>,
        fallback: Box<dyn DetectorBackend>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Fallback-only stack (no model configured).
    pub fn fallback_only(fallback: Box<dyn DetectorBackend>) -> Self {
        Self {
            primary: None,
            fallback,
        }
    }

    pub fn detect(&mut self, image: &RgbImage) -> DetectorOutcome {
        if let Some(primary) = self.primary.as_mut() {
            match primary.detect(image) {
                Ok(boxes) => return DetectorOutcome::Detections(boxes),
                Err(e) => {
                    log::debug!("{} backend unavailable: {}", primary.name(), e);
                }
            }
        }
        match self.fallback.detect(image) {
            Ok(boxes) => DetectorOutcome::Detections(boxes),
            Err(e) => {
                log::warn!("{} fallback backend failed: {}", self.fallback.name(), e);
                DetectorOutcome::Unavailable
            }
        }
    }
}
