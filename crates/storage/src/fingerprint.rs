// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic fingerprinting over extracted package content.

use anvil_core::Fingerprint;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::cache::StorageError;

/// Fingerprint a directory tree by hashing a sorted listing of
/// `(relative_path, content)` pairs. Sorting the listing first is what
/// makes the result independent of the host's directory-iteration order,
/// which is the property the spec requires: two installs of the same
/// (name, version, url) triple must produce equal fingerprints on any
/// supported host.
pub fn fingerprint_dir(root: &Path) -> Result<Fingerprint, StorageError> {
    let mut entries = Vec::new();
    collect_files(root, root, &mut entries)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (rel_path, contents) in &entries {
        hasher.update(rel_path.as_bytes());
        hasher.update([0u8]); // separator, avoids "ab"+"c" colliding with "a"+"bc"
        hasher.update(contents);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Ok(Fingerprint::from_bytes(bytes))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> Result<(), StorageError> {
    let read_dir = std::fs::read_dir(dir)
        .map_err(|source| StorageError::Io { path: dir.to_path_buf(), source })?;
    for entry in read_dir {
        let entry = entry.map_err(|source| StorageError::Io { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|source| StorageError::Io { path: path.clone(), source })?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let contents = std::fs::read(&path).map_err(|source| StorageError::Io { path: path.clone(), source })?;
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push((rel, contents));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn same_content_produces_same_fingerprint() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        fs::write(dir_a.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir_a.path().join("sub")).unwrap();
        fs::write(dir_a.path().join("sub/b.txt"), b"world").unwrap();

        fs::write(dir_b.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir_b.path().join("sub")).unwrap();
        fs::write(dir_b.path().join("sub/b.txt"), b"world").unwrap();

        let fp_a = fingerprint_dir(dir_a.path()).unwrap();
        let fp_b = fingerprint_dir(dir_b.path()).unwrap();
        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn different_content_produces_different_fingerprint() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        fs::write(dir_a.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir_b.path().join("a.txt"), b"goodbye").unwrap();

        let fp_a = fingerprint_dir(dir_a.path()).unwrap();
        let fp_b = fingerprint_dir(dir_b.path()).unwrap();
        assert_ne!(fp_a, fp_b);
    }

    #[test]
    fn fingerprint_is_independent_of_directory_iteration_order() {
        // Two directories with the same files, created in a different
        // insertion order, still reduce to the same sorted listing.
        let dir_a = tempfile::tempdir().unwrap();
        fs::write(dir_a.path().join("zzz.txt"), b"1").unwrap();
        fs::write(dir_a.path().join("aaa.txt"), b"2").unwrap();

        let dir_b = tempfile::tempdir().unwrap();
        fs::write(dir_b.path().join("aaa.txt"), b"2").unwrap();
        fs::write(dir_b.path().join("zzz.txt"), b"1").unwrap();

        assert_eq!(fingerprint_dir(dir_a.path()).unwrap(), fingerprint_dir(dir_b.path()).unwrap());
    }
}
