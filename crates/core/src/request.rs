// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request records: one per client submission.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cancel::CancellationPolicy;

crate::define_id! {
    /// Unique identifier for a submitted request.
    pub struct RequestId("req-");
}

/// What kind of operation a request performs, and its cancellation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Build,
    Deploy,
    Monitor,
    InstallDependencies,
    Status,
    Shutdown,
}

crate::simple_display! {
    RequestKind {
        Build => "build",
        Deploy => "deploy",
        Monitor => "monitor",
        InstallDependencies => "install-dependencies",
        Status => "status",
        Shutdown => "shutdown",
    }
}

impl RequestKind {
    /// Cancellation policy for this request kind (see the cancellation registry).
    ///
    /// `install-dependencies` continues to completion on cancel so the shared
    /// cache still gets populated; everything else aborts.
    pub fn cancellation_policy(self) -> CancellationPolicy {
        match self {
            RequestKind::InstallDependencies => CancellationPolicy::Continue,
            _ => CancellationPolicy::Cancellable,
        }
    }
}

/// Mutable lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

crate::simple_display! {
    RequestStatus {
        Queued => "queued",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Succeeded | RequestStatus::Failed | RequestStatus::Cancelled
        )
    }

    /// Process exit code convention: success 0, failure 1, cancelled 130.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            RequestStatus::Succeeded => Some(0),
            RequestStatus::Failed => Some(1),
            RequestStatus::Cancelled => Some(130),
            RequestStatus::Queued | RequestStatus::Running => None,
        }
    }
}

/// The caller's process identity, used for liveness-based cancellation and
/// for attributing held locks in `/api/locks/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub pid: u32,
    pub cwd: PathBuf,
}

/// A client submission, held in memory for the lifetime of its dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
    pub caller: CallerIdentity,
    #[serde(default)]
    pub params: serde_json::Value,
    pub created_at_ms: u64,
    pub status: RequestStatus,
}

impl Request {
    pub fn new(kind: RequestKind, caller: CallerIdentity, params: serde_json::Value, created_at_ms: u64) -> Self {
        Self { id: RequestId::new(), kind, caller, params, created_at_ms, status: RequestStatus::Queued }
    }

    pub fn cancellation_policy(&self) -> CancellationPolicy {
        self.kind.cancellation_policy()
    }
}

crate::builder! {
    pub struct RequestBuilder => Request {
        set {
            id: RequestId = RequestId::new(),
            kind: RequestKind = RequestKind::Build,
            caller: CallerIdentity = CallerIdentity { pid: 1, cwd: PathBuf::from("/tmp") },
            params: serde_json::Value = serde_json::Value::Null,
            created_at_ms: u64 = 1_000_000,
            status: RequestStatus = RequestStatus::Queued,
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
