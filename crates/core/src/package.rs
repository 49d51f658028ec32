// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Package task records: nodes in the install DAG driven by
//! `anvil-engine::pipeline`.

use serde::{Deserialize, Serialize};

use crate::cache::Fingerprint;

crate::define_id! {
    /// Identifies one node in a package install DAG.
    pub struct PackageTaskId("pkg-");
}

/// Pipeline stage a task is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Downloading,
    Unpacking,
    Installing,
    Done,
    Failed,
    Cancelled,
}

crate::simple_display! {
    Stage {
        Pending => "pending",
        Downloading => "downloading",
        Unpacking => "unpacking",
        Installing => "installing",
        Done => "done",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed | Stage::Cancelled)
    }

    /// The stage that follows this one on success, or `None` if terminal.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Pending => Some(Stage::Downloading),
            Stage::Downloading => Some(Stage::Unpacking),
            Stage::Unpacking => Some(Stage::Installing),
            Stage::Installing => Some(Stage::Done),
            Stage::Done | Stage::Failed | Stage::Cancelled => None,
        }
    }
}

/// Why a task transitioned to `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskFailureReason {
    /// All stage-specific retries were exhausted.
    RetriesExhausted { message: String },
    /// A permanent error (HTTP 4xx, fingerprint mismatch) was observed.
    Permanent { message: String },
    /// A transitive dependency failed first.
    DependencyFailed { upstream: PackageTaskId },
}

crate::simple_display! {
    TaskFailureReason {
        RetriesExhausted(..) => "retries exhausted",
        Permanent(..) => "permanent failure",
        DependencyFailed(..) => "depends on failed task",
    }
}

/// Per-stage retry counters, reset when the task advances past that stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounters {
    pub download_attempts: u32,
    pub unpack_attempts: u32,
}

/// A node in the install DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageTask {
    pub id: PackageTaskId,
    pub name: String,
    pub version: String,
    pub fetch_url: String,
    pub fingerprint: Option<Fingerprint>,
    pub stage: Stage,
    pub deps: Vec<PackageTaskId>,
    pub retries: RetryCounters,
    pub failure: Option<TaskFailureReason>,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
}

impl PackageTask {
    pub fn new(name: impl Into<String>, version: impl Into<String>, fetch_url: impl Into<String>) -> Self {
        Self {
            id: PackageTaskId::new(),
            name: name.into(),
            version: version.into(),
            fetch_url: fetch_url.into(),
            fingerprint: None,
            stage: Stage::Pending,
            deps: Vec::new(),
            retries: RetryCounters::default(),
            failure: None,
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    pub fn with_deps(mut self, deps: Vec<PackageTaskId>) -> Self {
        self.deps = deps;
        self
    }

    /// True once every dependency in `done` is satisfied — the task may
    /// enter `downloading`.
    pub fn is_ready(&self, done: &std::collections::HashSet<PackageTaskId>) -> bool {
        self.stage == Stage::Pending && self.deps.iter().all(|d| done.contains(d))
    }

    pub fn mark_failed(&mut self, reason: TaskFailureReason) {
        self.stage = Stage::Failed;
        self.failure = Some(reason);
    }

    /// The key used for cache-hit lookups and content addressing: the
    /// (name, version, url) triple must produce equal fingerprints across
    /// reinstalls on any supported host.
    pub fn install_key(&self) -> (String, String, String) {
        (self.name.clone(), self.version.clone(), self.fetch_url.clone())
    }
}

crate::builder! {
    pub struct PackageTaskBuilder => PackageTask {
        into {
            name: String = "platform-esp32",
            version: String = "3.3.5",
            fetch_url: String = "https://example.invalid/platform-esp32-3.3.5.zip",
        }
        set {
            stage: Stage = Stage::Pending,
            deps: Vec<PackageTaskId> = Vec::new(),
            retries: RetryCounters = RetryCounters::default(),
        }
        option {
            fingerprint: Fingerprint = None,
            failure: TaskFailureReason = None,
            started_at_ms: u64 = None,
            finished_at_ms: u64 = None,
        }
        computed {
            id: PackageTaskId = PackageTaskId::new(),
        }
    }
}

#[cfg(test)]
#[path = "package_tests.rs"]
mod tests;
