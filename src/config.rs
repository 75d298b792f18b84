use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:52049";
const DEFAULT_PASSPHRASE: &str = "asdf";
const DEFAULT_CAMERA_URL: &str = "stub://local";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_INTERVAL_MS: u64 = 200;
const DEFAULT_MOSAIC_SCALE: f32 = 0.1;
const DEFAULT_RAW_DIR: &str = "record";
const DEFAULT_MOSAIC_DIR: &str = "record_mosaic";
const DEFAULT_ENCRYPT_DIR: &str = "record_encrypt";

#[derive(Debug, Deserialize, Default)]
struct VeilcamConfigFile {
    bind_addr: Option<String>,
    passphrase: Option<String>,
    camera: Option<CameraConfigFile>,
    capture: Option<CaptureConfigFile>,
    dirs: Option<DirsConfigFile>,
    clear_on_start: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    interval_ms: Option<u64>,
    mosaic_scale: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DirsConfigFile {
    raw: Option<PathBuf>,
    mosaic: Option<PathBuf>,
    encrypted: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VeilcamConfig {
    pub bind_addr: String,
    /// Archive passphrase used by the capture pipeline. Clients never receive
    /// it; they must present a matching passphrase to unlock decryption.
    pub passphrase: String,
    pub camera: CameraSettings,
    pub capture: CaptureSettings,
    pub dirs: DirSettings,
    /// Clear all three artifact directories at daemon startup.
    pub clear_on_start: bool,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Minimum spacing between accepted samples; also the session push cadence.
    pub interval: Duration,
    pub mosaic_scale: f32,
}

#[derive(Debug, Clone)]
pub struct DirSettings {
    pub raw: PathBuf,
    pub mosaic: PathBuf,
    pub encrypted: PathBuf,
}

impl Default for VeilcamConfig {
    fn default() -> Self {
        Self::from_file(VeilcamConfigFile::default()).expect("defaults are valid")
    }
}

impl VeilcamConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VEILCAM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VeilcamConfigFile) -> Result<Self> {
        let bind_addr = file
            .bind_addr
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let passphrase = file
            .passphrase
            .unwrap_or_else(|| DEFAULT_PASSPHRASE.to_string());
        let camera = CameraSettings {
            url: file
                .camera
                .as_ref()
                .and_then(|camera| camera.url.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };
        let capture = CaptureSettings {
            interval: Duration::from_millis(
                file.capture
                    .as_ref()
                    .and_then(|capture| capture.interval_ms)
                    .unwrap_or(DEFAULT_INTERVAL_MS),
            ),
            mosaic_scale: file
                .capture
                .as_ref()
                .and_then(|capture| capture.mosaic_scale)
                .unwrap_or(DEFAULT_MOSAIC_SCALE),
        };
        let dirs = DirSettings {
            raw: file
                .dirs
                .as_ref()
                .and_then(|dirs| dirs.raw.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RAW_DIR)),
            mosaic: file
                .dirs
                .as_ref()
                .and_then(|dirs| dirs.mosaic.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MOSAIC_DIR)),
            encrypted: file
                .dirs
                .and_then(|dirs| dirs.encrypted)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ENCRYPT_DIR)),
        };
        Ok(Self {
            bind_addr,
            passphrase,
            camera,
            capture,
            dirs,
            clear_on_start: file.clear_on_start.unwrap_or(true),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("VEILCAM_BIND_ADDR") {
            if !addr.trim().is_empty() {
                self.bind_addr = addr;
            }
        }
        if let Ok(passphrase) = std::env::var("VEILCAM_PASSPHRASE") {
            if !passphrase.is_empty() {
                self.passphrase = passphrase;
            }
        }
        if let Ok(url) = std::env::var("VEILCAM_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(interval) = std::env::var("VEILCAM_INTERVAL_MS") {
            let ms: u64 = interval
                .parse()
                .map_err(|_| anyhow!("VEILCAM_INTERVAL_MS must be an integer number of ms"))?;
            self.capture.interval = Duration::from_millis(ms);
        }
        if let Ok(root) = std::env::var("VEILCAM_DATA_ROOT") {
            if !root.trim().is_empty() {
                let root = PathBuf::from(root);
                self.dirs.raw = root.join(DEFAULT_RAW_DIR);
                self.dirs.mosaic = root.join(DEFAULT_MOSAIC_DIR);
                self.dirs.encrypted = root.join(DEFAULT_ENCRYPT_DIR);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.passphrase.is_empty() {
            return Err(anyhow!("passphrase must not be empty"));
        }
        if self.capture.interval.is_zero() {
            return Err(anyhow!("capture interval must be greater than zero"));
        }
        if !(self.capture.mosaic_scale > 0.0 && self.capture.mosaic_scale <= 1.0) {
            return Err(anyhow!("mosaic_scale must be in (0, 1]"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<VeilcamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
