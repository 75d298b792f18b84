//! On-disk artifact layout.
//!
//! Three directories hold the three representations of a captured frame:
//! raw (`record/frame_XXXX.jpg`, transient), redacted
//! (`record_mosaic/frame_XXXX.jpg`) and encrypted
//! (`record_encrypt/frame_XXXX.jpg.enc`). The capture pipeline is the only
//! writer; sessions poll for whatever artifact sorts last at read time.
//! Files are atomically renamed into place so a reader never observes a
//! partial write.

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};

use crate::config::DirSettings;

const FRAME_PREFIX: &str = "frame_";
const IMAGE_EXT: &str = "jpg";
const ENCRYPTED_SUFFIX: &str = ".enc";

#[derive(Clone, Debug)]
pub struct ArtifactStore {
    raw_dir: PathBuf,
    mosaic_dir: PathBuf,
    encrypted_dir: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating any missing directories.
    pub fn open(dirs: &DirSettings) -> Result<Self> {
        for dir in [&dirs.raw, &dirs.mosaic, &dirs.encrypted] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(Self {
            raw_dir: dirs.raw.clone(),
            mosaic_dir: dirs.mosaic.clone(),
            encrypted_dir: dirs.encrypted.clone(),
        })
    }

    /// Remove every artifact in all three directories (startup cleanup).
    pub fn clear_all(&self) -> Result<()> {
        for dir in [&self.raw_dir, &self.mosaic_dir, &self.encrypted_dir] {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        Ok(())
    }

    /// Fixed-width stem for a captured sequence number, e.g. `frame_0004`.
    pub fn stem_for(seq: u32) -> String {
        format!("{}{:04}", FRAME_PREFIX, seq)
    }

    pub fn raw_path(&self, stem: &str) -> PathBuf {
        self.raw_dir.join(format!("{}.{}", stem, IMAGE_EXT))
    }

    pub fn mosaic_path(&self, stem: &str) -> PathBuf {
        self.mosaic_dir.join(format!("{}.{}", stem, IMAGE_EXT))
    }

    pub fn encrypted_path(&self, stem: &str) -> PathBuf {
        self.encrypted_dir
            .join(format!("{}.{}{}", stem, IMAGE_EXT, ENCRYPTED_SUFFIX))
    }

    /// Latest redacted artifact, or None when nothing has been produced yet.
    pub fn latest_mosaic(&self) -> Option<PathBuf> {
        latest_in(&self.mosaic_dir, &format!(".{}", IMAGE_EXT))
    }

    /// Latest encrypted artifact.
    pub fn latest_encrypted(&self) -> Option<PathBuf> {
        latest_in(&self.encrypted_dir, ENCRYPTED_SUFFIX)
    }

    /// Any one encrypted artifact, for trial-decrypt key validation.
    pub fn any_encrypted(&self) -> Option<PathBuf> {
        first_in(&self.encrypted_dir, ENCRYPTED_SUFFIX)
    }

    /// Unsettled raw frames, sorted by name, as `(stem, path)` pairs.
    pub fn raw_backlog(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut names = list_frames(&self.raw_dir, &format!(".{}", IMAGE_EXT))?;
        names.sort();
        Ok(names
            .into_iter()
            .filter_map(|name| {
                let stem = name.strip_suffix(&format!(".{}", IMAGE_EXT))?.to_string();
                Some((stem, self.raw_dir.join(name)))
            })
            .collect())
    }

    /// Encode to JPEG and atomically write into place.
    pub fn write_jpeg(&self, path: &Path, image: &RgbImage) -> Result<()> {
        let bytes = encode_jpeg(image)?;
        write_atomic(path, &bytes)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// JPEG-encode an image into memory.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .map_err(|e| anyhow!("jpeg encode failed: {}", e))?;
    Ok(buf)
}

fn list_frames(dir: &Path, suffix: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(FRAME_PREFIX) && name.ends_with(suffix) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn latest_in(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let mut names = list_frames(dir, suffix).ok()?;
    names.sort();
    names.pop().map(|name| dir.join(name))
}

fn first_in(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let mut names = list_frames(dir, suffix).ok()?;
    names.sort();
    names.into_iter().next().map(|name| dir.join(name))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirSettings;
    use image::Rgb;

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

    #[test]
    fn stems_are_zero_padded() {
        assert_eq!(ArtifactStore::stem_for(4), "frame_0004");
        assert_eq!(ArtifactStore::stem_for(12345), "frame_12345");
    }

    #[test]
    fn paths_follow_artifact_naming() {
        let (_dir, store) = temp_store();
        assert!(store.raw_path("frame_0000").ends_with("record/frame_0000.jpg"));
        assert!(store
            .mosaic_path("frame_0000")
            .ends_with("record_mosaic/frame_0000.jpg"));
        assert!(store
            .encrypted_path("frame_0000")
            .ends_with("record_encrypt/frame_0000.jpg.enc"));
    }

    #[test]
    fn latest_is_lexicographically_last() {
        let (_dir, store) = temp_store();
        for stem in ["frame_0000", "frame_0002", "frame_0001"] {
            fs::write(store.mosaic_path(stem), b"jpg").unwrap();
        }
        let latest = store.latest_mosaic().unwrap();
        assert!(latest.ends_with("frame_0002.jpg"));
    }

    #[test]
    fn empty_dirs_have_no_latest() {
        let (_dir, store) = temp_store();
        assert!(store.latest_mosaic().is_none());
        assert!(store.latest_encrypted().is_none());
        assert!(store.any_encrypted().is_none());
    }

    #[test]
    fn non_frame_files_are_ignored() {
        let (_dir, store) = temp_store();
        fs::write(store.mosaic_dir.join("README.txt"), b"x").unwrap();
        fs::write(store.mosaic_dir.join("frame_0000.tmp"), b"x").unwrap();
        assert!(store.latest_mosaic().is_none());
    }

    #[test]
    fn clear_all_empties_every_dir() {
        let (_dir, store) = temp_store();
        fs::write(store.raw_path("frame_0000"), b"x").unwrap();
        fs::write(store.mosaic_path("frame_0000"), b"x").unwrap();
        fs::write(store.encrypted_path("frame_0000"), b"x").unwrap();
        store.clear_all().unwrap();
        assert!(store.raw_backlog().unwrap().is_empty());
        assert!(store.latest_mosaic().is_none());
        assert!(store.latest_encrypted().is_none());
    }

    #[test]
    fn write_jpeg_produces_decodable_file() {
        let (_dir, store) = temp_store();
        let img = RgbImage::from_pixel(16, 16, Rgb([120, 40, 200]));
        let path = store.mosaic_path("frame_0000");
        store.write_jpeg(&path, &img).unwrap();
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 16));
    }
}
