mod backend;
mod backends;
mod stack;

pub use backend::{DetectorBackend, FaceBox};
pub use backends::{CpuBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use stack::{DetectorOutcome, DetectorStack};

/// Build the detection stack for a deployment.
///
/// With the `backend-tract` feature and `VEILCAM_FACE_MODEL` pointing at an
/// ONNX face model, the model runs as primary with the CPU heuristic as
/// fallback. Otherwise the CPU heuristic runs alone.
pub fn default_stack(width: u32, height: u32) -> DetectorStack {
    #[cfg(feature = "backend-tract")]
    if let Ok(model_path) = std::env::var("VEILCAM_FACE_MODEL") {
        match TractBackend::new(&model_path, width, height) {
            Ok(backend) => {
                log::info!("face model loaded from {}", model_path);
                return DetectorStack::new(Some(Box::new(backend)), Box::new(CpuBackend::new()));
            }
            Err(e) => {
                log::warn!("face model unusable, using cpu fallback: {:#}", e);
            }
        }
    }
    #[cfg(not(feature = "backend-tract"))]
    let _ = (width, height);
    DetectorStack::fallback_only(Box::new(CpuBackend::new()))
}
