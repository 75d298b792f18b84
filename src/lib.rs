//! veilcam - privacy camera daemon
//!
//! Captures frames from a camera source, mosaics detected faces, encrypts the
//! originals into a passphrase-gated archive, and streams the redacted (or,
//! with a valid key, decrypted) feed to browser clients over a WebSocket.
//!
//! # Architecture
//!
//! - `detect`: face detector backends behind a two-stage fallback stack
//! - `redact`: mosaic transform applied to detected face regions
//! - `vault`: passphrase key derivation and authenticated file encryption
//! - `artifacts`: on-disk layout of raw/redacted/encrypted frame artifacts
//! - `capture`: sampling loop and per-frame settle state machine
//! - `session`: per-connection streaming/decryption state machine
//! - `web`: axum transport, bootstrap, and the select-driven session loop
//!
//! # Invariants
//!
//! 1. A raw frame is deleted only after both its redacted and encrypted
//!    artifacts exist on disk.
//! 2. The capture pipeline is the sole writer of the artifact directories;
//!    sessions only ever read the latest artifact.
//! 3. Redaction never fails open into an error: detector trouble degrades to
//!    the unmodified image, it never reaches the caller.
//! 4. Decryption failure with a wrong key is an expected, typed outcome used
//!    for key validation, not a crash.

pub mod artifacts;
pub mod capture;
pub mod config;
pub mod detect;
pub mod redact;
pub mod session;
pub mod vault;
pub mod web;

pub use artifacts::ArtifactStore;
pub use capture::{process_backlog, CapturePipeline};
pub use capture::source::{open_source, CameraSource, DirSource, SyntheticSource};
pub use config::VeilcamConfig;
pub use detect::{DetectorBackend, DetectorOutcome, DetectorStack, FaceBox};
pub use redact::Redactor;
pub use session::{ControlMessage, ServerMessage, Session};
pub use vault::{derive_key, ArchiveKey, VaultError};
