//! veilcamd - privacy camera daemon.
//!
//! Captures, redacts, and encrypts frames continuously while serving
//! streaming sessions over WebSocket. Configuration comes from the JSON file
//! named by `VEILCAM_CONFIG` plus `VEILCAM_*` environment overrides.

use anyhow::Result;

use veilcam::config::VeilcamConfig;
use veilcam::web;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = VeilcamConfig::load()?;
    log::info!(
        "veilcamd starting: camera={} interval={:?} bind={}",
        cfg.camera.url,
        cfg.capture.interval,
        cfg.bind_addr
    );
    web::run(cfg).await
}
