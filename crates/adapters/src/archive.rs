// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The archive-extraction collaborator: unpacks a downloaded package
//! archive (`.tar.gz` or `.zip`) into a staging directory. Format is
//! detected from the file extension, matching the convention toolchain
//! index files already use.

use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unrecognized archive format for {path}")]
    UnknownFormat { path: PathBuf },
    #[error("I/O error reading {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("archive {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn detect(path: &Path) -> Result<Self, ArchiveError> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else if name.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else {
            Err(ArchiveError::UnknownFormat { path: path.to_path_buf() })
        }
    }
}

/// Unpack `archive_path` into `dest_dir`, creating it if necessary.
/// Returns the number of entries extracted. `dest_dir` is expected to be
/// a fresh staging directory owned by the caller (the package pipeline's
/// `temp_extract_<task_id>` convention) — this function does not clean up
/// on failure, leaving that to the caller's cancellation/cleanup path.
pub fn unpack(archive_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    std::fs::create_dir_all(dest_dir).map_err(|source| ArchiveError::Io { path: dest_dir.to_path_buf(), source })?;

    match ArchiveFormat::detect(archive_path)? {
        ArchiveFormat::TarGz => unpack_tar_gz(archive_path, dest_dir),
        ArchiveFormat::Zip => unpack_zip(archive_path, dest_dir),
    }
}

fn unpack_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(archive_path).map_err(|source| ArchiveError::Io { path: archive_path.to_path_buf(), source })?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    let entries = archive
        .entries()
        .map_err(|source| ArchiveError::Io { path: archive_path.to_path_buf(), source })?;

    let mut count = 0;
    for entry in entries {
        let mut entry = entry.map_err(|source| ArchiveError::Io { path: archive_path.to_path_buf(), source })?;
        let entry_path = entry
            .path()
            .map_err(|e| ArchiveError::Corrupt { path: archive_path.to_path_buf(), message: e.to_string() })?
            .into_owned();
        reject_path_traversal(archive_path, &entry_path)?;
        entry
            .unpack_in(dest_dir)
            .map_err(|source| ArchiveError::Io { path: dest_dir.join(&entry_path), source })?;
        count += 1;
    }
    Ok(count)
}

fn unpack_zip(archive_path: &Path, dest_dir: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(archive_path).map_err(|source| ArchiveError::Io { path: archive_path.to_path_buf(), source })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ArchiveError::Corrupt { path: archive_path.to_path_buf(), message: e.to_string() })?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::Corrupt { path: archive_path.to_path_buf(), message: e.to_string() })?;
        let Some(entry_path) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(ArchiveError::Corrupt {
                path: archive_path.to_path_buf(),
                message: format!("entry {i} has an unsafe path"),
            });
        };
        let out_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| ArchiveError::Io { path: out_path.clone(), source })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ArchiveError::Io { path: parent.to_path_buf(), source })?;
            }
            let mut out_file = File::create(&out_path).map_err(|source| ArchiveError::Io { path: out_path.clone(), source })?;
            std::io::copy(&mut entry, &mut out_file).map_err(|source| ArchiveError::Io { path: out_path.clone(), source })?;
        }
    }
    Ok(archive.len())
}

/// Reject `..`-containing archive entries before they're unpacked —
/// a malicious or corrupt archive should not be able to write outside
/// the staging directory (Zip Slip and its tar equivalent).
fn reject_path_traversal(archive_path: &Path, entry_path: &Path) -> Result<(), ArchiveError> {
    if entry_path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(ArchiveError::Corrupt {
            path: archive_path.to_path_buf(),
            message: format!("entry {} escapes the archive root", entry_path.display()),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
