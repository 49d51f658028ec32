// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named resource lock vocabulary shared between `anvil-daemon::locks` (the
//! in-memory manager) and every crate that needs to describe what it wants
//! locked without depending on the daemon.
//!
//! File-based locks are never used here for intra-process coordination —
//! see the daemon's lock manager module for the single exception (the
//! singleton bootstrap lock file), which is a process-level concern, not a
//! resource-ownership one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

crate::define_id! {
    /// A token identifying one specific acquisition of a named lock.
    pub struct LeaseId("lse-");
}

/// What happens when a lock is requested while already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Fail with `WouldBlock`; caller must retry or surface contention.
    Wait,
    /// Notify the current owner and reassign the lock (used by deploy
    /// preempting a device reader/writer lease).
    Preempt,
}

/// Errors raised by the lock manager's `acquire`/`release` operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("lock '{name}' is held by pid {holder_pid}")]
    WouldBlock { name: String, holder_pid: u32 },
    #[error("lock '{name}' was preempted, new owner pid {new_owner_pid}")]
    Preempted { name: String, new_owner_pid: u32 },
}

/// A named exclusive resource lock record, as reported by `status()`.
///
/// Resource names follow the conventions `env:<name>`, `device:<port>`,
/// `install:<name>@<version>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub name: String,
    pub owner_pid: u32,
    pub lease_id: LeaseId,
    pub age_ms: u64,
}
