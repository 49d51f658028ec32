// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-request output context, carried explicitly into worker callbacks.
//!
//! The underlying requirement (design note §9) is per-request-scoped
//! logging/verbosity that must survive across helper invocations without
//! being passed as an explicit parameter everywhere. Rather than a
//! process-global mutable (the pattern being re-architected away from),
//! `BuildContext` is captured by value into each work item dispatched onto
//! a shared worker pool, so concurrent builds sharing the compilation pool
//! never observe each other's verbosity, timestamp, or log destination.

use std::path::PathBuf;
use std::sync::Arc;

use crate::request::RequestId;

/// Verbosity level selected by the client for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

/// Per-request isolated output state (spec §3 "Build context").
///
/// Cloning a `BuildContext` is cheap (an `Arc`'d log path plus `Copy`
/// fields) and is exactly how it should be threaded into a worker
/// callback: each clone refers to the same request's log file but is a
/// logically independent value, so nothing about it is shared mutable
/// state between requests.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub request_id: RequestId,
    pub started_at_ms: u64,
    pub verbosity: Verbosity,
    pub log_path: Arc<PathBuf>,
}

impl BuildContext {
    pub fn new(request_id: RequestId, started_at_ms: u64, verbosity: Verbosity, log_path: PathBuf) -> Self {
        Self { request_id, started_at_ms, verbosity, log_path: Arc::new(log_path) }
    }

    /// Derive a context for a sub-operation (e.g. one package task, one
    /// translation unit) that inherits the parent request's verbosity and
    /// log destination but is otherwise an independent value — this is the
    /// "explicit capture" step a worker performs before invoking the
    /// request's callbacks.
    pub fn for_worker(&self) -> Self {
        self.clone()
    }
}
