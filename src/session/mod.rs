//! Per-connection streaming session state machine.
//!
//! A session is a pure consumer of the artifact store: it never writes into
//! the record directories and holds no reference to the capture pipeline.
//! All transitions are socket-free (`handle_control` for inbound messages,
//! `on_tick` for the push timer) so the protocol is testable without a
//! network in the loop.
//!
//! Decryption is opt-in per session. A passphrase is validated by trial
//! decryption against an existing encrypted artifact; once accepted, ticks
//! serve decrypted frames until the key stops working, at which point the
//! session demotes itself to mosaic frames rather than dropping the
//! connection.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::artifacts::{encode_jpeg, ArtifactStore};
use crate::vault::{self, ArchiveKey};

/// Client-to-server control messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    StreamRequest,
    StopStream,
    SetDecryptionKey {
        #[serde(default)]
        key: Option<String>,
    },
}

/// Server-to-client messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StreamFrame {
        /// Base64 JPEG bytes.
        data: String,
        filename: String,
        decrypted: bool,
    },
    StreamComplete,
    DecryptionKeyValid { message: String },
    DecryptionKeyInvalid { message: String },
    DecryptionDisabled { message: String },
    DecryptionError { message: String },
}

pub struct Session {
    store: ArtifactStore,
    streaming: bool,
    key: Option<ArchiveKey>,
}

impl Session {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            streaming: false,
            key: None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Apply one inbound control message, returning the messages to push.
    pub fn handle_control(&mut self, msg: ControlMessage) -> Vec<ServerMessage> {
        match msg {
            ControlMessage::StreamRequest => {
                self.streaming = true;
                // Serve the newest redacted frame right away rather than
                // making the client wait out a full timer period.
                self.mosaic_frame().into_iter().collect()
            }
            ControlMessage::StopStream => {
                self.streaming = false;
                vec![ServerMessage::StreamComplete]
            }
            ControlMessage::SetDecryptionKey { key } => self.set_key(key),
        }
    }

    /// Push-timer tick. Returns nothing unless the session is streaming.
    pub fn on_tick(&mut self) -> Vec<ServerMessage> {
        if !self.streaming {
            return Vec::new();
        }
        if self.key.is_some() {
            return self.decrypted_tick();
        }
        self.mosaic_frame().into_iter().collect()
    }

    fn set_key(&mut self, key: Option<String>) -> Vec<ServerMessage> {
        let Some(passphrase) = key.filter(|k| !k.is_empty()) else {
            self.key = None;
            return vec![ServerMessage::DecryptionDisabled {
                message: "decryption disabled".to_string(),
            }];
        };

        let candidate = vault::derive_key(&passphrase);
        // The only proof a passphrase is right is that it opens an envelope
        // this process sealed. No ciphertext on disk means no proof.
        let Some(sample) = self.store.any_encrypted() else {
            log::info!("key rejected: no encrypted frames to validate against");
            return vec![ServerMessage::DecryptionKeyInvalid {
                message: "invalid decryption key".to_string(),
            }];
        };
        match trial_decrypt(&sample, &candidate) {
            Ok(()) => {
                self.key = Some(candidate);
                vec![ServerMessage::DecryptionKeyValid {
                    message: "decryption key accepted".to_string(),
                }]
            }
            Err(e) => {
                log::info!("key rejected: {}", e);
                vec![ServerMessage::DecryptionKeyInvalid {
                    message: "invalid decryption key".to_string(),
                }]
            }
        }
    }

    /// One tick in decrypted mode. Any failure to produce a decrypted frame
    /// demotes the session back to mosaic streaming; the connection stays up.
    fn decrypted_tick(&mut self) -> Vec<ServerMessage> {
        let key = self.key.as_ref().cloned();
        let Some(key) = key else {
            return Vec::new();
        };

        let Some(envelope) = self.store.latest_encrypted() else {
            self.key = None;
            return vec![ServerMessage::DecryptionError {
                message: "no encrypted frames available".to_string(),
            }];
        };

        match decrypt_frame(&envelope, &key) {
            Ok(Some(frame)) => vec![frame],
            // Decrypted fine but the payload would not re-encode; skip this
            // tick and try the next artifact.
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("decryption failed mid-stream, demoting to mosaic: {}", e);
                self.key = None;
                vec![ServerMessage::DecryptionError {
                    message: "decryption failed".to_string(),
                }]
            }
        }
    }

    /// Newest redacted frame, if any has been produced yet.
    fn mosaic_frame(&self) -> Option<ServerMessage> {
        let path = self.store.latest_mosaic()?;
        let filename = file_name(&path)?;
        match reencode(&std::fs::read(&path).ok()?) {
            Some(data) => Some(ServerMessage::StreamFrame {
                data,
                filename,
                decrypted: false,
            }),
            None => {
                log::warn!("skipping unreadable mosaic frame {}", path.display());
                None
            }
        }
    }
}

/// Decrypt an envelope through a scratch file, re-encode the payload, and
/// build a decrypted `stream_frame`. The scratch file is removed on all
/// paths. `Ok(None)` means the plaintext was not a decodable image.
fn decrypt_frame(envelope: &Path, key: &ArchiveKey) -> Result<Option<ServerMessage>, vault::VaultError> {
    let scratch = tempfile::NamedTempFile::new()?;
    vault::decrypt_to_file(envelope, key, scratch.path())?;
    let bytes = std::fs::read(scratch.path())?;

    let Some(data) = reencode(&bytes) else {
        log::warn!("decrypted frame {} is not a valid image", envelope.display());
        return Ok(None);
    };
    let filename = file_name(envelope)
        .map(|n| n.trim_end_matches(".enc").to_string())
        .unwrap_or_default();
    Ok(Some(ServerMessage::StreamFrame {
        data,
        filename,
        decrypted: true,
    }))
}

/// Decode and JPEG-re-encode image bytes, then base64 them for the wire.
/// Returns None when the bytes do not decode as an image.
fn reencode(bytes: &[u8]) -> Option<String> {
    let image = image::load_from_memory(bytes).ok()?.to_rgb8();
    let jpeg = encode_jpeg(&image).ok()?;
    Some(BASE64.encode(jpeg))
}

fn trial_decrypt(envelope: &Path, key: &ArchiveKey) -> Result<(), vault::VaultError> {
    let bytes = std::fs::read(envelope)?;
    vault::decrypt_bytes(key, &bytes).map(|_| ())
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use crate::config::DirSettings;
    use crate::vault::derive_key;
    use image::{Rgb, RgbImage};

    fn temp_store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let dirs = DirSettings {
            raw: dir.path().join("record"),
            mosaic: dir.path().join("record_mosaic"),
            encrypted: dir.path().join("record_encrypt"),
        };
        let store = ArtifactStore::open(&dirs).unwrap();
        (dir, store)
    }

    fn seed_mosaic(store: &ArtifactStore, stem: &str) {
        let img = RgbImage::from_pixel(16, 16, Rgb([9, 9, 9]));
        store.write_jpeg(&store.mosaic_path(stem), &img).unwrap();
    }

    fn seed_encrypted(store: &ArtifactStore, stem: &str, passphrase: &str) {
        let img = RgbImage::from_pixel(16, 16, Rgb([40, 80, 120]));
        let raw = store.raw_path(stem);
        store.write_jpeg(&raw, &img).unwrap();
        vault::encrypt_to_file(&raw, &derive_key(passphrase), &store.encrypted_path(stem)).unwrap();
        std::fs::remove_file(raw).unwrap();
    }

    #[test]
    fn stream_request_pushes_latest_mosaic_immediately() {
        let (_dir, store) = temp_store();
        seed_mosaic(&store, "frame_0000");
        seed_mosaic(&store, "frame_0001");

        let mut session = Session::new(store);
        let out = session.handle_control(ControlMessage::StreamRequest);
        assert_eq!(out.len(), 1);
        match &out[0] {
            ServerMessage::StreamFrame { filename, decrypted, data } => {
                assert_eq!(filename, "frame_0001.jpg");
                assert!(!decrypted);
                assert!(!data.is_empty());
            }
            other => panic!("expected stream_frame, got {:?}", other),
        }
        assert!(session.is_streaming());
    }

    #[test]
    fn stream_request_with_no_frames_pushes_nothing() {
        let (_dir, store) = temp_store();
        let mut session = Session::new(store);
        assert!(session.handle_control(ControlMessage::StreamRequest).is_empty());
        assert!(session.is_streaming());
        assert!(session.on_tick().is_empty());
    }

    #[test]
    fn stop_stream_completes_and_silences_ticks() {
        let (_dir, store) = temp_store();
        seed_mosaic(&store, "frame_0000");
        let mut session = Session::new(store);
        session.handle_control(ControlMessage::StreamRequest);

        let out = session.handle_control(ControlMessage::StopStream);
        assert!(matches!(out[0], ServerMessage::StreamComplete));
        assert!(!session.is_streaming());
        assert!(session.on_tick().is_empty());
    }

    #[test]
    fn wrong_key_is_rejected_and_stays_mosaic() {
        let (_dir, store) = temp_store();
        seed_mosaic(&store, "frame_0000");
        seed_encrypted(&store, "frame_0000", "asdf");

        let mut session = Session::new(store);
        session.handle_control(ControlMessage::StreamRequest);
        let out = session.handle_control(ControlMessage::SetDecryptionKey {
            key: Some("wrong".to_string()),
        });
        assert!(matches!(out[0], ServerMessage::DecryptionKeyInvalid { .. }));

        let tick = session.on_tick();
        assert!(matches!(
            tick[0],
            ServerMessage::StreamFrame { decrypted: false, .. }
        ));
    }

    #[test]
    fn key_without_ciphertexts_is_rejected() {
        let (_dir, store) = temp_store();
        let mut session = Session::new(store);
        let out = session.handle_control(ControlMessage::SetDecryptionKey {
            key: Some("asdf".to_string()),
        });
        assert!(matches!(out[0], ServerMessage::DecryptionKeyInvalid { .. }));
    }

    #[test]
    fn valid_key_switches_ticks_to_decrypted_frames() {
        let (_dir, store) = temp_store();
        seed_encrypted(&store, "frame_0000", "asdf");

        let mut session = Session::new(store);
        session.handle_control(ControlMessage::StreamRequest);
        let out = session.handle_control(ControlMessage::SetDecryptionKey {
            key: Some("asdf".to_string()),
        });
        assert!(matches!(out[0], ServerMessage::DecryptionKeyValid { .. }));

        let tick = session.on_tick();
        match &tick[0] {
            ServerMessage::StreamFrame { filename, decrypted, data } => {
                assert!(decrypted);
                assert_eq!(filename, "frame_0000.jpg");
                // The payload must decode back to the frame dimensions.
                let jpeg = BASE64.decode(data).unwrap();
                let img = image::load_from_memory(&jpeg).unwrap();
                assert_eq!(img.to_rgb8().dimensions(), (16, 16));
            }
            other => panic!("expected decrypted stream_frame, got {:?}", other),
        }
    }

    #[test]
    fn losing_the_ciphertext_demotes_to_mosaic() {
        let (_dir, store) = temp_store();
        seed_mosaic(&store, "frame_0000");
        seed_encrypted(&store, "frame_0000", "asdf");

        let mut session = Session::new(store.clone());
        session.handle_control(ControlMessage::StreamRequest);
        session.handle_control(ControlMessage::SetDecryptionKey {
            key: Some("asdf".to_string()),
        });

        std::fs::remove_file(store.encrypted_path("frame_0000")).unwrap();
        let out = session.on_tick();
        assert!(matches!(out[0], ServerMessage::DecryptionError { .. }));

        // Subsequent ticks behave as plain mosaic streaming.
        let next = session.on_tick();
        assert!(matches!(
            next[0],
            ServerMessage::StreamFrame { decrypted: false, .. }
        ));
    }

    #[test]
    fn corrupted_ciphertext_demotes_to_mosaic() {
        let (_dir, store) = temp_store();
        seed_mosaic(&store, "frame_0000");
        seed_encrypted(&store, "frame_0000", "asdf");

        let mut session = Session::new(store.clone());
        session.handle_control(ControlMessage::StreamRequest);
        session.handle_control(ControlMessage::SetDecryptionKey {
            key: Some("asdf".to_string()),
        });

        std::fs::write(store.encrypted_path("frame_0000"), b"garbage").unwrap();
        let out = session.on_tick();
        assert!(matches!(out[0], ServerMessage::DecryptionError { .. }));
    }

    #[test]
    fn absent_key_disables_decryption() {
        let (_dir, store) = temp_store();
        seed_encrypted(&store, "frame_0000", "asdf");

        let mut session = Session::new(store);
        session.handle_control(ControlMessage::StreamRequest);
        session.handle_control(ControlMessage::SetDecryptionKey {
            key: Some("asdf".to_string()),
        });

        let out = session.handle_control(ControlMessage::SetDecryptionKey { key: None });
        assert!(matches!(out[0], ServerMessage::DecryptionDisabled { .. }));
        // Back to mosaic mode; with no mosaic frames the tick is silent.
        assert!(session.on_tick().is_empty());
    }

    #[test]
    fn empty_string_key_disables_decryption() {
        let (_dir, store) = temp_store();
        let mut session = Session::new(store);
        let out = session.handle_control(ControlMessage::SetDecryptionKey {
            key: Some(String::new()),
        });
        assert!(matches!(out[0], ServerMessage::DecryptionDisabled { .. }));
    }

    #[test]
    fn wire_shapes_match_the_protocol() {
        let parsed: ControlMessage =
            serde_json::from_str(r#"{"type":"set_decryption_key","key":"asdf"}"#).unwrap();
        assert!(matches!(parsed, ControlMessage::SetDecryptionKey { key: Some(k) } if k == "asdf"));

        let parsed: ControlMessage = serde_json::from_str(r#"{"type":"stream_request"}"#).unwrap();
        assert!(matches!(parsed, ControlMessage::StreamRequest));

        let json = serde_json::to_value(ServerMessage::StreamComplete).unwrap();
        assert_eq!(json, serde_json::json!({"type": "stream_complete"}));

        let json = serde_json::to_value(ServerMessage::StreamFrame {
            data: "QUJD".to_string(),
            filename: "frame_0000.jpg".to_string(),
            decrypted: true,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "stream_frame",
                "data": "QUJD",
                "filename": "frame_0000.jpg",
                "decrypted": true
            })
        );
    }
}
