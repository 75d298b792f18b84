//! veilcam-unseal - operator tool to decrypt a single archived frame.
//!
//! Offline counterpart to the in-session decryption path. A wrong passphrase
//! is reported as such; no output file is written unless the envelope
//! authenticates.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use veilcam::vault::{self, VaultError};

#[derive(Parser)]
#[command(name = "veilcam-unseal", about = "Decrypt an archived frame")]
struct Cli {
    /// Encrypted frame, e.g. record_encrypt/frame_0000.jpg.enc
    input: PathBuf,

    /// Output path for the decrypted image. Defaults to the input path with
    /// the .enc suffix removed, in the current directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Archive passphrase.
    #[arg(short, long, env = "VEILCAM_PASSPHRASE")]
    passphrase: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let output = match cli.output {
        Some(path) => path,
        None => default_output(&cli.input)?,
    };

    let key = vault::derive_key(&cli.passphrase);
    match vault::decrypt_to_file(&cli.input, &key, &output) {
        Ok(()) => {
            log::info!("decrypted {} -> {}", cli.input.display(), output.display());
            Ok(())
        }
        Err(VaultError::AuthFailure) => {
            Err(anyhow!("wrong passphrase or corrupted file, nothing written"))
        }
        Err(e) => Err(anyhow!("decryption failed: {}", e)),
    }
}

fn default_output(input: &PathBuf) -> Result<PathBuf> {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("input path has no file name"))?;
    let trimmed = name.strip_suffix(".enc").unwrap_or(name);
    if trimmed == name {
        log::warn!("input does not end in .enc, writing {}.out", trimmed);
        return Ok(PathBuf::from(format!("{}.out", trimmed)));
    }
    Ok(PathBuf::from(trimmed))
}
