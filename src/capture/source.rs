//! Camera frame sources.
//!
//! Sources produce decoded RGB frames for the capture pipeline:
//! - `stub://<name>`: synthetic moving gradient (tests, development)
//! - `dir://<path>`: replays a directory of JPEGs in name order, then ends
//!
//! A source read error is end-of-stream: the pipeline terminates its loop and
//! releases the source. Sources never write to disk.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

/// A camera handle: one frame per call, error on disconnect/end of stream.
pub trait CameraSource: Send {
    fn connect(&mut self) -> Result<()>;
    fn next_frame(&mut self) -> Result<RgbImage>;
    /// Release the underlying handle. Called exactly once when the capture
    /// loop exits.
    fn release(&mut self) {}
}

/// Open a source for a camera URL.
pub fn open_source(url: &str, width: u32, height: u32) -> Result<Box<dyn CameraSource>> {
    if let Some(name) = url.strip_prefix("stub://") {
        return Ok(Box::new(SyntheticSource::new(name, width, height)));
    }
    if let Some(path) = url.strip_prefix("dir://") {
        return Ok(Box::new(DirSource::new(PathBuf::from(path))));
    }
    Err(anyhow!("unsupported camera url: {}", url))
}

/// Synthetic frame source producing a slowly shifting gradient.
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            frame_count: 0,
        }
    }
}

impl CameraSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("camera connected: stub://{} (synthetic)", self.name);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RgbImage> {
        self.frame_count += 1;
        let shift = (self.frame_count % 256) as u32;
        Ok(RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        }))
    }

    fn release(&mut self) {
        log::info!(
            "camera released: stub://{} after {} frames",
            self.name,
            self.frame_count
        );
    }
}

/// Replays a directory of JPEG files in name order, then reports end of
/// stream. Useful for demos and deterministic pipeline tests.
pub struct DirSource {
    root: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl DirSource {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            files: Vec::new(),
            cursor: 0,
        }
    }
}

impl CameraSource for DirSource {
    fn connect(&mut self) -> Result<()> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to open {}", self.root.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("jpg") {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(anyhow!("no jpg frames in {}", self.root.display()));
        }
        log::info!(
            "camera connected: dir://{} ({} frames)",
            self.root.display(),
            files.len()
        );
        self.files = files;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RgbImage> {
        let Some(path) = self.files.get(self.cursor) else {
            return Err(anyhow!("end of stream"));
        };
        self.cursor += 1;
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        Ok(image.to_rgb8())
    }

    fn release(&mut self) {
        log::info!("camera released: dir://{}", self.root.display());
    }
}
