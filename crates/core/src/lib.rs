// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-core: shared domain types for the Anvil embedded-firmware build
//! coordinator.
//!
//! This crate has no knowledge of HTTP, sockets, or subprocess invocation —
//! it only defines the records every other crate agrees on: requests,
//! locks, cancellation, package/compile jobs, and the build context that
//! rides along with a request's work.

pub mod macros;

pub mod cache;
pub mod cancel;
pub mod clock;
pub mod compile;
pub mod context;
pub mod device;
pub mod error;
pub mod id;
pub mod lock;
pub mod manifest;
pub mod package;
pub mod request;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use cache::{CacheManifest, Fingerprint};
pub use cancel::{CancellationPolicy, CancellationToken, CancelledReason};
pub use clock::{Clock, FakeClock, SystemClock};
pub use compile::{CompilationJob, CompileJobId, CompileStatus, ParallelismMode};
pub use context::{BuildContext, Verbosity};
pub use device::{DeviceSessionId, LeaseMode, SerialLine};
pub use error::ErrorKind;
pub use id::short;
pub use lock::{LeaseId, LockError, LockPolicy, LockStatus};
pub use manifest::{Environment, LibRef, ManifestError, ProjectManifest};
pub use package::{PackageTask, PackageTaskId, RetryCounters, Stage, TaskFailureReason};
pub use request::{CallerIdentity, Request, RequestId, RequestKind, RequestStatus};
