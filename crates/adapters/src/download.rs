// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The download collaborator: fetches a package archive from a URL to a
//! local path. Behind a trait so the package pipeline's retry/backoff
//! logic can be unit tested against a fake that fails on command instead
//! of reaching the network.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("http error fetching {url}: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("server at {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("I/O error writing {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Whether a failed download is worth retrying. Mirrors the
/// [`anvil_core::ErrorKind`] split between transient I/O and permanent
/// remote errors: a 4xx means the URL itself is wrong and retrying won't
/// help, a 5xx or transport error might succeed on the next attempt.
impl DownloadError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Http { .. } | DownloadError::Io { .. } => true,
            DownloadError::Status { status, .. } => !(400..500).contains(status),
        }
    }
}

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `url` and write its bytes to `dest`. The destination's parent
    /// directory is created if missing; `dest` itself is written via a
    /// temp-file-then-rename so a failed download never leaves a
    /// half-written file at the final path.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

/// Real downloader backed by `reqwest`.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| DownloadError::Http { url: url.to_string(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status { url: url.to_string(), status: status.as_u16() });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::Io { path: parent.to_path_buf(), source })?;
        }

        let tmp_path = dest.with_extension("part");
        let bytes = response.bytes().await.map_err(|source| DownloadError::Http { url: url.to_string(), source })?;
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| DownloadError::Io { path: tmp_path.clone(), source })?;
        tokio::fs::rename(&tmp_path, dest)
            .await
            .map_err(|source| DownloadError::Io { path: dest.to_path_buf(), source })?;

        Ok(bytes.len() as u64)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A scripted downloader: each call pops the next outcome from a
    /// queue. Used to exercise the package pipeline's retry policy
    /// against a scripted sequence of transient failures followed by
    /// success, without touching the network.
    pub struct FakeDownloader {
        outcomes: Mutex<VecDeque<Result<Vec<u8>, DownloadError>>>,
    }

    impl FakeDownloader {
        pub fn new() -> Self {
            Self { outcomes: Mutex::new(VecDeque::new()) }
        }

        pub fn push_success(&self, contents: impl Into<Vec<u8>>) {
            self.outcomes.lock().push_back(Ok(contents.into()));
        }

        pub fn push_failure(&self, err: DownloadError) {
            self.outcomes.lock().push_back(Err(err));
        }
    }

    impl Default for FakeDownloader {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
            let outcome = self.outcomes.lock().pop_front().unwrap_or_else(|| {
                Err(DownloadError::Status { url: url.to_string(), status: 404 })
            });
            match outcome {
                Ok(bytes) => {
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent).map_err(|source| DownloadError::Io { path: parent.to_path_buf(), source })?;
                    }
                    std::fs::write(dest, &bytes).map_err(|source| DownloadError::Io { path: dest.to_path_buf(), source })?;
                    Ok(bytes.len() as u64)
                }
                Err(e) => Err(e),
            }
        }
    }
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
