//! Integration tests for artifact checksums and change decisions.

use std::fs;

use fleet_core::cache::{CHECKSUM_FILE_NAME, LocalChecksumStore};
use fleet_core::detect::{ChangeDecision, ChangeDetector, ChangeReason};
use tempfile::TempDir;

fn artifact(temp: &TempDir, files: &[(&str, &str)]) -> std::path::PathBuf {
    let dir = temp.path().join("dist").join("api");
    for (rel, content) in files {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

#[tokio::test]
async fn first_run_without_checksum_file_is_changed() {
    let temp = TempDir::new().unwrap();
    let dir = artifact(&temp, &[("index.js", "v1")]);
    let store = LocalChecksumStore::new();

    let decision = ChangeDetector::default()
        .detect(&dir, store.read(&dir).as_deref())
        .await;

    assert!(matches!(
        decision,
        ChangeDecision::Changed {
            checksum: Some(_),
            reason: ChangeReason::NoPriorChecksum,
        }
    ));
}

#[tokio::test]
async fn recorded_checksum_makes_rebuild_unchanged() {
    let temp = TempDir::new().unwrap();
    let dir = artifact(&temp, &[("index.js", "v1"), ("lib/util.js", "u")]);
    let store = LocalChecksumStore::new();
    let detector = ChangeDetector::default();

    let first = detector.detect(&dir, None).await;
    store.write("api", &dir, first.checksum().unwrap()).unwrap();
    assert!(dir.join(CHECKSUM_FILE_NAME).is_file());

    // The checksum file itself must not feed back into the hash
    let second = detector.detect(&dir, store.read(&dir).as_deref()).await;
    assert!(!second.is_changed());
    assert_eq!(second.checksum(), first.checksum());
}

#[tokio::test]
async fn content_change_is_detected() {
    let temp = TempDir::new().unwrap();
    let dir = artifact(&temp, &[("index.js", "v1")]);
    let detector = ChangeDetector::default();
    let before = detector.detect(&dir, None).await;

    fs::write(dir.join("index.js"), "v2").unwrap();
    let after = detector.detect(&dir, before.checksum()).await;

    assert!(matches!(
        after,
        ChangeDecision::Changed {
            reason: ChangeReason::ChecksumDiffers,
            ..
        }
    ));
}

#[tokio::test]
async fn merged_files_are_not_mistaken_for_the_prior_tree() {
    let before = TempDir::new().unwrap();
    let prior_dir = artifact(&before, &[("a.js", ""), ("b.js", "")]);
    let prior = ChangeDetector::checksum(&prior_dir).unwrap();

    let after = TempDir::new().unwrap();
    let dir = artifact(&after, &[("a.js", "b.js\0")]);
    let decision = ChangeDetector::default()
        .detect(&dir, Some(prior.as_str()))
        .await;

    assert!(matches!(
        decision,
        ChangeDecision::Changed {
            reason: ChangeReason::ChecksumDiffers,
            ..
        }
    ));
}

#[tokio::test]
async fn renamed_file_changes_checksum() {
    let temp = TempDir::new().unwrap();
    let dir = artifact(&temp, &[("a.js", "same")]);
    let before = ChangeDetector::checksum(&dir).unwrap();

    fs::rename(dir.join("a.js"), dir.join("b.js")).unwrap();
    let after = ChangeDetector::checksum(&dir).unwrap();

    assert_ne!(before, after);
}

#[tokio::test]
async fn single_file_artifact_is_hashed_directly() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("bundle.zip");
    fs::write(&file, b"zip bytes").unwrap();

    let decision = ChangeDetector::default().detect(&file, None).await;
    assert_eq!(decision.checksum().map(str::len), Some(64));
}

#[tokio::test]
async fn missing_artifact_fails_open() {
    let temp = TempDir::new().unwrap();
    let decision = ChangeDetector::default()
        .detect(&temp.path().join("never-built"), Some("abc"))
        .await;

    assert!(decision.is_changed());
    assert_eq!(decision.checksum(), None);
}

#[tokio::test]
async fn force_ignores_matching_checksum() {
    let temp = TempDir::new().unwrap();
    let dir = artifact(&temp, &[("index.js", "v1")]);
    let checksum = ChangeDetector::checksum(&dir).unwrap();

    let decision = ChangeDetector::new(true).detect(&dir, Some(checksum.as_str())).await;
    assert_eq!(
        decision,
        ChangeDecision::Changed {
            checksum: Some(checksum),
            reason: ChangeReason::Forced,
        }
    );
}
