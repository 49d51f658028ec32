// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compilation job records consumed by `anvil-engine::compile`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

crate::define_id! {
    /// Identifies one submitted compilation job.
    pub struct CompileJobId("cmp-");
}

/// Lifecycle of one translation unit's compile job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

crate::simple_display! {
    CompileStatus {
        Pending => "pending",
        Running => "running",
        Done => "done",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Requested parallelism for one build's compile phase (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelismMode {
    /// Serial, inline, no pool dispatch. An explicit debugging mode.
    Serial,
    /// Host CPU count, using the shared process-wide pool.
    Default,
    /// A dedicated pool of `n` workers scoped to this request.
    Custom { n: usize },
}

impl ParallelismMode {
    pub fn worker_count(self, host_cpus: usize) -> usize {
        match self {
            ParallelismMode::Serial => 1,
            ParallelismMode::Default => host_cpus.max(1),
            ParallelismMode::Custom { n } => n.max(1),
        }
    }
}

/// One translation unit's compile request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationJob {
    pub id: CompileJobId,
    pub source: PathBuf,
    pub object: PathBuf,
    pub flags: Vec<String>,
    pub env: std::collections::BTreeMap<String, String>,
    pub status: CompileStatus,
}

impl CompilationJob {
    pub fn new(source: PathBuf, object: PathBuf, flags: Vec<String>) -> Self {
        Self {
            id: CompileJobId::new(),
            source,
            object,
            flags,
            env: std::collections::BTreeMap::new(),
            status: CompileStatus::Pending,
        }
    }

    /// Incremental-skip decision: a job is skipped (immediately `done`) if
    /// the object file exists and its mtime is not older than the source
    /// file's. No compiler is invoked in that case.
    pub fn should_skip(&self) -> bool {
        let (Ok(src_meta), Ok(obj_meta)) = (self.source.metadata(), self.object.metadata()) else {
            return false;
        };
        let (Ok(src_mtime), Ok(obj_mtime)) = (src_meta.modified(), obj_meta.modified()) else {
            return false;
        };
        obj_mtime >= src_mtime
    }
}

/// Pure function version of [`CompilationJob::should_skip`] for use by
/// callers that already hold mtimes (e.g. from a batched directory walk),
/// avoiding redundant `stat` calls.
pub fn mtime_allows_skip(source_mtime: SystemTime, object_mtime: Option<SystemTime>) -> bool {
    matches!(object_mtime, Some(obj) if obj >= source_mtime)
}

crate::builder! {
    pub struct CompilationJobBuilder => CompilationJob {
        into {
            source: PathBuf = "/project/src/main.cpp",
            object: PathBuf = "/project/build/uno/release/main.cpp.o",
        }
        set {
            flags: Vec<String> = Vec::new(),
            env: std::collections::BTreeMap<String, String> = std::collections::BTreeMap::new(),
            status: CompileStatus = CompileStatus::Pending,
        }
        computed {
            id: CompileJobId = CompileJobId::new(),
        }
    }
}
