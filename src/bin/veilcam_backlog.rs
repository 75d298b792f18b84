//! veilcam-backlog - settle leftover raw frames without starting the daemon.
//!
//! Useful after a crash when the daemon should not come back up yet: every
//! raw frame gains its redacted and encrypted artifacts, then the raw file
//! is removed. Uses the same configuration sources as veilcamd.

use anyhow::Result;

use veilcam::artifacts::ArtifactStore;
use veilcam::capture::process_backlog;
use veilcam::config::VeilcamConfig;
use veilcam::detect;
use veilcam::redact::Redactor;
use veilcam::vault;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = VeilcamConfig::load()?;
    let store = ArtifactStore::open(&cfg.dirs)?;
    let key = vault::derive_key(&cfg.passphrase);
    let mut redactor = Redactor::new(
        detect::default_stack(cfg.camera.width, cfg.camera.height),
        cfg.capture.mosaic_scale,
    );

    let settled = process_backlog(&store, &mut redactor, &key)?;
    log::info!("backlog sweep complete: {} frame(s) settled", settled);
    Ok(())
}
