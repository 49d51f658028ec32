// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-adapters: the system's only doorways to the network, the
//! filesystem's archive formats, and external processes.
//!
//! Every collaborator here is defined behind a trait with a `fake`
//! module gated on `test-support`, so `anvil-engine`/`anvil-build`/
//! `anvil-device` can exercise their retry, scheduling, and error-mapping
//! logic without touching a real network or spawning a real compiler.

pub mod archive;
pub mod download;
pub mod subprocess;
pub mod toolchain;

pub use archive::{unpack, ArchiveError, ArchiveFormat};
pub use download::{DownloadError, Downloader, HttpDownloader};
pub use subprocess::{CapturedOutput, Invocation, SpawnError};
pub use toolchain::{ProcessRunner, RealProcessRunner};
