// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The progress callback protocol the pipeline reports through.
//!
//! `anvil-engine` has no notion of a terminal or a WebSocket — it only
//! emits [`ProgressEvent`]s through a [`ProgressSink`]. `anvil-daemon`
//! owns the live multi-line renderer and the non-TTY plain-line fallback;
//! both consume the same event stream, which is the "one callback
//! protocol, two renderers" split the spec calls for.

use anvil_core::{PackageTaskId, Stage};

/// Percent-complete (download/unpack) or free-form status text (install).
#[derive(Debug, Clone, PartialEq)]
pub enum TaskProgress {
    Percent(u8),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A task entered a new stage, or reported incremental progress
    /// within its current stage.
    Task { task_id: PackageTaskId, name: String, version: String, stage: Stage, progress: Option<TaskProgress> },
    /// Totals across the whole install run, re-emitted after every task
    /// transition.
    Summary { total: usize, active: usize, done: usize },
}

/// Receives [`ProgressEvent`]s from the pipeline. `Send + Sync` because
/// events are emitted from whichever task-driver future happens to be
/// running, potentially concurrently for distinct tasks.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event. Used by callers (most unit tests, `install-deps`
/// invoked as a pure library call) that don't need a live view.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: ProgressEvent) {}
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Collects every emitted event in order, for assertions in tests.
    #[derive(Default)]
    pub struct RecordingProgressSink {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RecordingProgressSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().clone()
        }
    }

    impl ProgressSink for RecordingProgressSink {
        fn emit(&self, event: ProgressEvent) {
            self.events.lock().push(event);
        }
    }
}
