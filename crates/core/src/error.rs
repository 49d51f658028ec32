// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy.
//!
//! Every crate boundary in the workspace defines its own `thiserror` enum;
//! this module holds the abstract [`ErrorKind`] classification they map
//! into at the wire edge, matching the error table in the coordination
//! design (transient vs. permanent, retryable vs. not).

use serde::{Deserialize, Serialize};

/// Abstract classification of a failure, independent of which crate raised it.
///
/// This is not itself an `Error` impl — it is the tag carried alongside a
/// human-readable message when an error crosses the wire boundary, so a
/// client can decide whether to retry without parsing message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network reset, timeout, permission held by a scanner — stage retry applies.
    TransientIo,
    /// HTTP 4xx, fingerprint mismatch — never retried.
    PermanentRemote,
    /// An upstream task in the DAG failed; this task was poisoned.
    DependencyFailure,
    /// A cycle was detected at DAG submission time.
    DependencyCycle,
    /// A named resource lock is held by another request.
    LockContended,
    /// A higher-priority request (deploy) preempted this one's lease.
    Preempted,
    /// Cancel signal observed, or owning client process is dead.
    Cancelled,
    /// A child process produced no output within its inactivity budget.
    ChildProcessInactivity,
    /// A child process exited with a nonzero status.
    ChildProcessNonzero,
    /// A manifest is missing a required field.
    DefectiveManifest,
}

crate::simple_display! {
    ErrorKind {
        TransientIo => "transient I/O error",
        PermanentRemote => "permanent remote error",
        DependencyFailure => "dependency failed",
        DependencyCycle => "dependency cycle",
        LockContended => "lock contended",
        Preempted => "preempted",
        Cancelled => "cancelled",
        ChildProcessInactivity => "child process inactive",
        ChildProcessNonzero => "child process exited nonzero",
        DefectiveManifest => "defective manifest",
    }
}

impl ErrorKind {
    /// Whether a failure of this kind is ever worth a caller-side retry.
    ///
    /// This only describes the *class*; actual retry bounds and backoff
    /// are stage-specific and live in `anvil-engine`.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientIo)
    }
}
