use super::*;
use anvil_core::test_support::sample_fingerprint;
use std::fs;

fn sample_manifest(fp: Fingerprint) -> CacheManifest {
    CacheManifest::new("platform-esp32", "platform", "3.3.5", "https://example.invalid/p.zip", fp, 1000)
}

#[test]
fn fresh_entry_is_not_installed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PackageCache::new(dir.path().to_path_buf());
    assert!(!cache.is_installed(&sample_fingerprint(1)));
}

#[test]
fn commit_makes_entry_installed_and_manifest_readable() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PackageCache::new(dir.path().to_path_buf());
    let staging = dir.path().join("staging");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("bin"), b"firmware-bytes").unwrap();

    let fp = sample_fingerprint(7);
    let manifest = sample_manifest(fp);
    cache.commit(&staging, &manifest).unwrap();

    assert!(cache.is_installed(&fp));
    let read_back = cache.read_manifest(&fp).unwrap();
    assert_eq!(read_back, manifest);
    assert!(cache.entry_dir(&fp).join("bin").is_file());
}

#[test]
fn recommitting_same_fingerprint_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PackageCache::new(dir.path().to_path_buf());
    let fp = sample_fingerprint(9);
    let manifest = sample_manifest(fp);

    let staging1 = dir.path().join("staging1");
    fs::create_dir_all(&staging1).unwrap();
    fs::write(staging1.join("bin"), b"v1").unwrap();
    cache.commit(&staging1, &manifest).unwrap();
    let first_bin = fs::read(cache.entry_dir(&fp).join("bin")).unwrap();

    let staging2 = dir.path().join("staging2");
    fs::create_dir_all(&staging2).unwrap();
    fs::write(staging2.join("bin"), b"v2-should-be-discarded").unwrap();
    cache.commit(&staging2, &manifest).unwrap();

    let second_bin = fs::read(cache.entry_dir(&fp).join("bin")).unwrap();
    assert_eq!(first_bin, second_bin);
    assert!(!staging2.exists());
}

#[test]
fn discard_staging_removes_manifest_less_directory() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PackageCache::new(dir.path().to_path_buf());
    let staging = dir.path().join("temp_extract_abc");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("partial"), b"incomplete").unwrap();

    cache.discard_staging(&staging).unwrap();
    assert!(!staging.exists());
}

#[test]
fn discard_staging_refuses_to_delete_a_committed_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PackageCache::new(dir.path().to_path_buf());
    let fp = sample_fingerprint(3);
    let manifest = sample_manifest(fp);
    let staging = dir.path().join("staging");
    fs::create_dir_all(&staging).unwrap();
    cache.commit(&staging, &manifest).unwrap();

    let entry_dir = cache.entry_dir(&fp);
    cache.discard_staging(&entry_dir).unwrap();
    assert!(entry_dir.join("manifest.json").is_file());
}

#[test]
fn discard_staging_on_missing_dir_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PackageCache::new(dir.path().to_path_buf());
    cache.discard_staging(&dir.path().join("never_existed")).unwrap();
}

#[test]
fn reading_manifest_of_uninstalled_entry_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cache = PackageCache::new(dir.path().to_path_buf());
    let result = cache.read_manifest(&sample_fingerprint(5));
    assert!(matches!(result, Err(StorageError::Io { .. })));
}
