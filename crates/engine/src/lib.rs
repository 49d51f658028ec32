// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-engine: the package install pipeline and the shared compilation
//! pool (spec §4.6, §4.7).
//!
//! Both live here because they share one primitive — a bounded pool of OS
//! threads bridged into async callers, [`pool::BlockingPool`] — and one
//! scheduling idea: a DAG of work, re-evaluated for newly-ready items as
//! each piece completes. Neither crate knows anything about HTTP, the
//! daemon's request dispatch, or per-platform compiler flags; those are
//! `anvil-daemon` and `anvil-build`'s job respectively.

pub mod compile;
pub mod dag;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod retry;

pub use compile::{CompilationPool, CompileError, CompileOutcome, InvocationBuilder};
pub use dag::{DagError, TaskGraph};
pub use pipeline::{PackagePipeline, PipelineError, PipelineReport, PoolSizes, TaskOutcome};
pub use pool::BlockingPool;
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, TaskProgress};
