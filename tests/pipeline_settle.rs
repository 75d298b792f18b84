//! End-to-end capture and settle behavior against the public API.

use std::time::Duration;

use image::{Rgb, RgbImage};

use veilcam::artifacts::ArtifactStore;
use veilcam::capture::{process_backlog, source::open_source, CapturePipeline};
use veilcam::config::DirSettings;
use veilcam::detect::{DetectorStack, StubBackend};
use veilcam::redact::Redactor;
use veilcam::vault::{decrypt_bytes, derive_key};

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

fn redactor() -> Redactor {
    Redactor::new(DetectorStack::fallback_only(Box::new(StubBackend::empty())), 0.1)
}

#[tokio::test]
async fn dir_capture_settles_every_frame_and_seals_with_the_passphrase() {
    let (_dir, store) = temp_store();
    let frames_dir = tempfile::tempdir().unwrap();
    for (i, shade) in [60u8, 120, 180].iter().enumerate() {
        let frame = RgbImage::from_pixel(48, 48, Rgb([*shade, *shade, *shade]));
        frame.save(frames_dir.path().join(format!("{i}.jpg"))).unwrap();
    }

    let source = open_source(&format!("dir://{}", frames_dir.path().display()), 48, 48).unwrap();
    let pipeline = CapturePipeline::new(
        source,
        redactor(),
        store.clone(),
        derive_key("asdf"),
        Duration::from_millis(1),
    );
    pipeline.run().await;

    // Every settled frame has both durable artifacts and no raw leftover.
    assert!(store.raw_backlog().unwrap().is_empty());
    assert!(store.mosaic_path("frame_0000").exists());
    assert!(store.encrypted_path("frame_0000").exists());

    // The envelope opens with the same passphrase and holds a real JPEG.
    let envelope = std::fs::read(store.encrypted_path("frame_0000")).unwrap();
    let clear = decrypt_bytes(&derive_key("asdf"), &envelope).unwrap();
    let img = image::load_from_memory(&clear).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (48, 48));

    // A different passphrase does not open it.
    assert!(decrypt_bytes(&derive_key("not-asdf"), &envelope).is_err());
}

#[tokio::test]
async fn restart_backlog_then_capture_reuses_no_artifacts() {
    let (_dir, store) = temp_store();

    // Simulate a crash: two raw frames never settled.
    let stale = RgbImage::from_pixel(32, 32, Rgb([5, 5, 5]));
    store.write_jpeg(&store.raw_path("frame_0000"), &stale).unwrap();
    store.write_jpeg(&store.raw_path("frame_0001"), &stale).unwrap();

    let key = derive_key("asdf");
    let settled = process_backlog(&store, &mut redactor(), &key).unwrap();
    assert_eq!(settled, 2);
    assert!(store.raw_backlog().unwrap().is_empty());
    assert!(store.latest_encrypted().unwrap().ends_with("frame_0001.jpg.enc"));

    // A fresh capture run starts its counter at zero and overwrites the
    // settled artifacts rather than erroring.
    let frames_dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(32, 32, Rgb([200, 0, 0]))
        .save(frames_dir.path().join("new.jpg"))
        .unwrap();
    let source = open_source(&format!("dir://{}", frames_dir.path().display()), 32, 32).unwrap();
    CapturePipeline::new(source, redactor(), store.clone(), key.clone(), Duration::from_millis(1))
        .run()
        .await;

    let envelope = std::fs::read(store.encrypted_path("frame_0000")).unwrap();
    let clear = decrypt_bytes(&key, &envelope).unwrap();
    let img = image::load_from_memory(&clear).unwrap().to_rgb8();
    // JPEG is lossy; the red frame survives within compression tolerance.
    let p = img.get_pixel(0, 0);
    assert!(p.0[0] > 150 && p.0[1] < 60 && p.0[2] < 60, "unexpected pixel {:?}", p);
}

#[test]
fn corrupt_raw_survives_the_backlog_sweep() {
    let (_dir, store) = temp_store();
    std::fs::write(store.raw_path("frame_0000"), b"truncated jpeg").unwrap();
    let good = RgbImage::from_pixel(32, 32, Rgb([90, 90, 90]));
    store.write_jpeg(&store.raw_path("frame_0001"), &good).unwrap();

    let settled = process_backlog(&store, &mut redactor(), &derive_key("asdf")).unwrap();

    // The good frame settles, the corrupt one is retained for inspection.
    assert_eq!(settled, 1);
    assert!(store.raw_path("frame_0000").exists());
    assert!(!store.mosaic_path("frame_0000").exists());
    assert!(!store.raw_path("frame_0001").exists());
    assert!(store.encrypted_path("frame_0001").exists());
}

#[test]
fn clear_on_start_leaves_empty_directories() {
    let (_dir, store) = temp_store();
    let img = RgbImage::from_pixel(16, 16, Rgb([1, 1, 1]));
    store.write_jpeg(&store.raw_path("frame_0000"), &img).unwrap();
    store.write_jpeg(&store.mosaic_path("frame_0000"), &img).unwrap();
    std::fs::write(store.encrypted_path("frame_0000"), b"envelope").unwrap();

    store.clear_all().unwrap();

    assert!(store.raw_backlog().unwrap().is_empty());
    assert!(store.latest_mosaic().is_none());
    assert!(store.latest_encrypted().is_none());
}
