// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation policy and token shapes shared between the daemon's
//! cancellation registry and the engines that poll it.
//!
//! The registry implementation (dual-channel signal + pid liveness, the
//! ~100ms TTL cache) lives in `anvil-daemon::cancellation`; this module
//! only defines the vocabulary every crate agrees on so `anvil-engine` and
//! `anvil-build` can accept a `CancellationToken` without depending on the
//! daemon crate.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-request-kind cancellation behavior (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Observed cancellation aborts the operation, releases locks, and
    /// transitions status to `cancelled`.
    Cancellable,
    /// Cancellation is reported for observability but the operation runs
    /// to completion (install-dependencies keeps populating the cache).
    Continue,
}

/// Why a cancellation was observed, surfaced in logs and terminal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledReason {
    /// An explicit cancel signal was delivered for the request id.
    Signal,
    /// The owning client process is no longer alive.
    ClientDead,
}

crate::simple_display! {
    CancelledReason {
        Signal => "cancel signal received",
        ClientDead => "owning client process is dead",
    }
}

/// A cheaply-cloned, checkpoint-polled cancellation flag.
///
/// This is the token that flows into `anvil-engine`/`anvil-build` work
/// items; it carries no knowledge of *why* it is set, only whether the
/// checkpoint should abort. The daemon's registry is responsible for
/// flipping the underlying flag and recording the reason elsewhere.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    /// Poll the token at a checkpoint. Cooperative, not preemptive: callers
    /// must call this explicitly at the checkpoint locations named in the
    /// concurrency model (dispatcher entry, between build phases, between
    /// package stages, inside pool wait loops).
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Flip the token. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
