// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed on-disk layout and atomic commit.

use anvil_core::{CacheManifest, Fingerprint};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("manifest at {path} is corrupt: {source}")]
    CorruptManifest { path: PathBuf, source: serde_json::Error },
}

const MANIFEST_FILE: &str = "manifest.json";

/// A per-user (or per-mode) package cache rooted at one directory.
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The content-addressed directory for a fingerprint: a two-character
    /// fan-out directory plus the full digest, so no single directory ever
    /// holds more than a few hundred entries under a large cache.
    pub fn entry_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        let hex = fingerprint.to_string();
        self.root.join(&hex[..2]).join(hex)
    }

    fn manifest_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.entry_dir(fingerprint).join(MANIFEST_FILE)
    }

    /// The sole "installed" signal: manifest presence, nothing else.
    pub fn is_installed(&self, fingerprint: &Fingerprint) -> bool {
        self.manifest_path(fingerprint).is_file()
    }

    pub fn read_manifest(&self, fingerprint: &Fingerprint) -> Result<CacheManifest, StorageError> {
        let path = self.manifest_path(fingerprint);
        let contents = std::fs::read_to_string(&path).map_err(|source| StorageError::Io { path: path.clone(), source })?;
        serde_json::from_str(&contents).map_err(|source| StorageError::CorruptManifest { path, source })
    }

    /// Commit a staged, fully-extracted package into the cache.
    ///
    /// `staging_dir` must already contain the extracted content; this
    /// renames it into its content-addressed home, then writes the
    /// manifest as the final step via write-to-temp-then-rename, so an
    /// observer never sees a half-written manifest file. If the entry
    /// already exists (a concurrent installer won the race), the staging
    /// directory is removed and the existing entry is left untouched —
    /// reinstalling the same (name, version, url) triple is idempotent.
    pub fn commit(
        &self,
        staging_dir: &Path,
        manifest: &CacheManifest,
    ) -> Result<PathBuf, StorageError> {
        let entry_dir = self.entry_dir(&manifest.fingerprint);
        if self.is_installed(&manifest.fingerprint) {
            let _ = std::fs::remove_dir_all(staging_dir);
            return Ok(entry_dir);
        }

        if let Some(parent) = entry_dir.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io { path: parent.to_path_buf(), source })?;
        }

        match std::fs::rename(staging_dir, &entry_dir) {
            Ok(()) => {}
            Err(_) if entry_dir.is_dir() => {
                // Lost a commit race against a concurrent installer.
                let _ = std::fs::remove_dir_all(staging_dir);
            }
            Err(source) => return Err(StorageError::Io { path: entry_dir.clone(), source }),
        }

        let manifest_json = serde_json::to_vec_pretty(manifest)
            .map_err(|source| StorageError::CorruptManifest { path: entry_dir.join(MANIFEST_FILE), source })?;
        let tmp_path = entry_dir.join(".manifest.json.tmp");
        std::fs::write(&tmp_path, &manifest_json).map_err(|source| StorageError::Io { path: tmp_path.clone(), source })?;
        std::fs::rename(&tmp_path, entry_dir.join(MANIFEST_FILE))
            .map_err(|source| StorageError::Io { path: entry_dir.join(MANIFEST_FILE), source })?;

        Ok(entry_dir)
    }

    /// Remove an in-flight extraction directory matching the well-known
    /// `temp_extract_` prefix convention, used by cancellation cleanup.
    /// Never touches a directory that already has a manifest.
    pub fn discard_staging(&self, staging_dir: &Path) -> Result<(), StorageError> {
        if staging_dir.join(MANIFEST_FILE).is_file() {
            return Ok(());
        }
        match std::fs::remove_dir_all(staging_dir) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path: staging_dir.to_path_buf(), source }),
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
