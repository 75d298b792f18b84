//! Capture pipeline: sample, redact, seal.
//!
//! Each accepted frame settles in a fixed order: raw JPEG to the raw
//! directory, redacted JPEG to the mosaic directory, encrypted envelope to
//! the encrypted directory, and only once both durable artifacts exist is
//! the raw file deleted and the counter advanced. A crash at any point
//! leaves either a fully settled frame or a raw file the backlog sweep can
//! finish later. Per-frame trouble is logged and skipped; only a source
//! read error ends the loop.

pub mod source;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbImage;

use crate::artifacts::ArtifactStore;
use crate::redact::Redactor;
use crate::vault::{self, ArchiveKey};
use source::CameraSource;

/// Cooperative yield between source reads, keeping the grab loop hot enough
/// to drain camera buffers without monopolizing the runtime.
const GRAB_PAUSE: Duration = Duration::from_millis(10);

pub struct CapturePipeline {
    source: Box<dyn CameraSource>,
    redactor: Redactor,
    store: ArtifactStore,
    key: ArchiveKey,
    interval: Duration,
    next_seq: u32,
}

impl CapturePipeline {
    pub fn new(
        source: Box<dyn CameraSource>,
        redactor: Redactor,
        store: ArtifactStore,
        key: ArchiveKey,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            redactor,
            store,
            key,
            interval,
            next_seq: 0,
        }
    }

    /// Run the capture loop until the source fails or ends.
    pub async fn run(mut self) {
        if let Err(e) = self.source.connect() {
            log::error!("camera connect failed: {:#}", e);
            return;
        }

        // First read is always accepted; afterwards frames are gated by the
        // capture interval.
        let mut last_accept: Option<Instant> = None;
        loop {
            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("camera read failed, stopping capture: {:#}", e);
                    break;
                }
            };

            let due = last_accept.map_or(true, |t| t.elapsed() >= self.interval);
            if due {
                last_accept = Some(Instant::now());
                match self.settle_frame(&frame) {
                    Ok(stem) => log::debug!("settled {}", stem),
                    Err(e) => log::warn!("frame dropped: {:#}", e),
                }
            }

            tokio::time::sleep(GRAB_PAUSE).await;
        }
        self.source.release();
    }

    /// Persist one frame through all three stages. The sequence counter only
    /// advances on full success, so a failed frame's number is reused.
    fn settle_frame(&mut self, frame: &RgbImage) -> Result<String> {
        let stem = ArtifactStore::stem_for(self.next_seq);
        let raw = self.store.raw_path(&stem);
        self.store
            .write_jpeg(&raw, frame)
            .with_context(|| format!("raw write failed for {}", stem))?;

        settle_raw(&self.store, &mut self.redactor, &self.key, &stem, frame)?;
        self.next_seq += 1;
        Ok(stem)
    }
}

/// Finish any raw frames left behind by a previous run. Frames that already
/// have both durable artifacts just lose their raw file; undecodable raw
/// files are kept for manual inspection.
pub fn process_backlog(
    store: &ArtifactStore,
    redactor: &mut Redactor,
    key: &ArchiveKey,
) -> Result<usize> {
    let mut settled = 0;
    for (stem, raw) in store.raw_backlog()? {
        if store.mosaic_path(&stem).exists() && store.encrypted_path(&stem).exists() {
            std::fs::remove_file(&raw)
                .with_context(|| format!("failed to remove settled raw {}", raw.display()))?;
            settled += 1;
            continue;
        }

        let frame = match image::open(&raw) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                log::warn!("backlog frame {} undecodable, keeping raw: {}", stem, e);
                continue;
            }
        };

        match settle_raw(store, redactor, key, &stem, &frame) {
            Ok(()) => settled += 1,
            Err(e) => log::warn!("backlog frame {} not settled: {:#}", stem, e),
        }
    }
    if settled > 0 {
        log::info!("backlog sweep settled {} frame(s)", settled);
    }
    Ok(settled)
}

/// Produce the mosaic and encrypted artifacts for an on-disk raw frame, then
/// remove the raw file. The raw file survives any failure.
fn settle_raw(
    store: &ArtifactStore,
    redactor: &mut Redactor,
    key: &ArchiveKey,
    stem: &str,
    frame: &RgbImage,
) -> Result<()> {
    let raw = store.raw_path(stem);
    let mosaic_path = store.mosaic_path(stem);
    let encrypted_path = store.encrypted_path(stem);

    let mosaic = redactor.redact(frame);
    store
        .write_jpeg(&mosaic_path, &mosaic)
        .with_context(|| format!("mosaic write failed for {}", stem))?;

    vault::encrypt_to_file(&raw, key, &encrypted_path)
        .with_context(|| format!("encryption failed for {}", stem))?;

    if mosaic_path.exists() && encrypted_path.exists() {
        std::fs::remove_file(&raw)
            .with_context(|| format!("failed to remove raw {}", raw.display()))?;
    }
    Ok(())
}
