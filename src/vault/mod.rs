//! Frame archive encryption.
//!
//! Keys are derived from a passphrase with PBKDF2-HMAC-SHA256 over a fixed
//! salt, so the same passphrase always yields the same key and key validity
//! can be checked by trial-decrypting a known ciphertext. Envelopes are
//! authenticated with ChaCha20-Poly1305; a wrong key or corrupted ciphertext
//! surfaces as the typed `VaultError::AuthFailure`, an expected outcome.
//!
//! The fixed salt is retained for bit-compatibility with existing archives.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KDF_SALT: &[u8] = b"salt_";
const KDF_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const ENVELOPE_MAGIC: &[u8; 4] = b"VLT1";
const ENVELOPE_VERSION: u8 = 1;
// magic + version + nonce + poly1305 tag
const MIN_ENVELOPE_LEN: usize = 4 + 1 + NONCE_LEN + 16;

/// Symmetric archive key derived from a passphrase.
///
/// No equality is exposed; two keys compare only by whether one decrypts a
/// ciphertext the other produced. Key material is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ArchiveKey([u8; KEY_LEN]);

impl std::fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ArchiveKey(..)")
    }
}

/// Derive an archive key from a passphrase. Deterministic: fixed salt, fixed
/// iteration count, fixed output length.
pub fn derive_key(passphrase: &str) -> ArchiveKey {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
    ArchiveKey(key)
}

/// Decrypt/encrypt failure taxonomy.
///
/// `AuthFailure` is the expected negative outcome of a trial-decrypt; callers
/// must be able to distinguish it from I/O or encoding trouble.
#[derive(Debug)]
pub enum VaultError {
    /// Wrong key or tampered ciphertext. Expected during key validation.
    AuthFailure,
    /// Ciphertext is not a recognizable envelope.
    Malformed(String),
    Io(std::io::Error),
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultError::AuthFailure => write!(f, "decryption failed: key mismatch or corrupt data"),
            VaultError::Malformed(msg) => write!(f, "malformed envelope: {}", msg),
            VaultError::Io(e) => write!(f, "vault i/o error: {}", e),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        VaultError::Io(e)
    }
}

/// Encrypt `plaintext` into a self-describing envelope.
pub fn encrypt_bytes(key: &ArchiveKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| anyhow!("vault encryption failed"))?;

    let mut out = Vec::with_capacity(MIN_ENVELOPE_LEN + plaintext.len());
    out.extend_from_slice(ENVELOPE_MAGIC);
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an envelope produced by `encrypt_bytes`.
pub fn decrypt_bytes(key: &ArchiveKey, envelope: &[u8]) -> Result<Vec<u8>, VaultError> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(VaultError::Malformed("envelope truncated".to_string()));
    }
    if &envelope[..4] != ENVELOPE_MAGIC {
        return Err(VaultError::Malformed("bad magic".to_string()));
    }
    if envelope[4] != ENVELOPE_VERSION {
        return Err(VaultError::Malformed(format!(
            "unsupported envelope version {}",
            envelope[4]
        )));
    }
    let nonce = &envelope[5..5 + NONCE_LEN];
    let ciphertext = &envelope[5 + NONCE_LEN..];

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::AuthFailure)
}

/// Read `plaintext_path`, encrypt, and atomically write the envelope to
/// `ciphertext_path`. The source file is left untouched on failure.
pub fn encrypt_to_file(plaintext_path: &Path, key: &ArchiveKey, ciphertext_path: &Path) -> Result<()> {
    let plaintext = fs::read(plaintext_path)?;
    let envelope = encrypt_bytes(key, &plaintext)?;
    write_atomic(ciphertext_path, &envelope)?;
    Ok(())
}

/// Decrypt `ciphertext_path` into `plaintext_path`.
///
/// `AuthFailure` (wrong key, corrupted envelope payload) is a distinguishable
/// outcome; nothing is written to `plaintext_path` unless decryption succeeds.
pub fn decrypt_to_file(
    ciphertext_path: &Path,
    key: &ArchiveKey,
    plaintext_path: &Path,
) -> Result<(), VaultError> {
    let envelope = fs::read(ciphertext_path)?;
    let mut plaintext = decrypt_bytes(key, &envelope)?;
    let result = write_atomic(plaintext_path, &plaintext);
    plaintext.zeroize();
    result.map_err(VaultError::Io)
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)
}
