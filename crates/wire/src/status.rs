// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress events streamed over a build/deploy WebSocket.
//!
//! One frame per event; the final frame on any stream is always
//! `Terminal`. Non-TTY clients render these as plain lines; the CLI's
//! interactive renderer repositions them into the live multi-line view
//! described in the package pipeline's progress aggregator.

use anvil_core::{PackageTaskId, RequestStatus, Stage};
use serde::{Deserialize, Serialize};

/// Percent-complete or free-form status text for one package task stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskProgress {
    Percent { value: u8 },
    Text { value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// One package task advanced stage or reported incremental progress.
    PackageTask { task_id: PackageTaskId, name: String, version: String, stage: Stage, progress: Option<TaskProgress> },
    /// A summary line: totals across all tasks in the current install.
    PackageSummary { total: usize, active: usize, done: usize },
    /// A translation unit finished (or was skipped) compiling.
    CompileUnit { source: String, skipped: bool },
    /// Free-form log line (link step, post-process, uploader output).
    Log { line: String },
    /// The request reached a terminal status; always the last frame.
    Terminal { status: RequestStatus, exit_code: i32, message: Option<String> },
}

impl StatusEvent {
    pub fn terminal(status: RequestStatus, message: Option<String>) -> Self {
        StatusEvent::Terminal { status, exit_code: status.exit_code().unwrap_or(1), message }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusEvent::Terminal { .. })
    }
}
