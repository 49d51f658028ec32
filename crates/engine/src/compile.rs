// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared compilation pool (spec §4.7): one translation unit per job,
//! dispatched over OS threads sized by [`ParallelismMode`], with
//! mtime-based incremental skip and a cancellation-checkpointed wait.
//!
//! `ParallelismMode::Serial` never touches a pool at all — jobs run
//! inline on the calling task, which is the "explicit debugging mode"
//! the spec calls for. `Default` and `Custom(n)` both go through a
//! [`BlockingPool`]; `anvil-build` is responsible for deciding whether a
//! `Default` request reuses one process-wide pool or gets its own
//! (`CompilationPool::new` always builds a fresh pool, so that choice is
//! the caller's to make by how many `CompilationPool`s it keeps alive).

use std::sync::Arc;
use std::time::Duration;

use anvil_adapters::toolchain::ProcessRunner;
use anvil_adapters::{Invocation, SpawnError};
use anvil_core::{CancellationToken, CompilationJob, CompileJobId, CompileStatus, ParallelismMode};
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use thiserror::Error;

use crate::pool::BlockingPool;

/// How often an in-flight wait loop re-checks the cancellation token
/// (spec §4.7: "checkpointed roughly every 500ms").
pub const CANCELLATION_CHECKPOINT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compiler invocation failed: {0}")]
    Spawn(#[from] SpawnError),
    #[error("compiler exited with a nonzero status (see captured stderr)")]
    NonZeroExit { stderr: String },
}

#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Skipped,
    Compiled,
    Failed { message: String },
    Cancelled,
}

type CompileJob = (CompilationJob, Invocation);
type CompileResult = Result<(), CompileError>;

/// Builds the [`Invocation`] for one compilation job. Supplied by
/// `anvil-build`, which owns per-platform compiler flag assembly; this
/// module only knows how to schedule and run whatever invocation it is
/// handed.
pub trait InvocationBuilder: Send + Sync {
    fn build(&self, job: &CompilationJob) -> Invocation;
}

/// A pool of compile workers sized by one [`ParallelismMode`]. `Serial`
/// never allocates a [`BlockingPool`] — jobs run inline on the caller.
pub enum CompilationPool {
    Serial { runner: Arc<dyn ProcessRunner> },
    Pooled { pool: BlockingPool<CompileJob, CompileResult> },
}

impl CompilationPool {
    pub fn new(
        mode: ParallelismMode,
        host_cpus: usize,
        runner: Arc<dyn ProcessRunner>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        if matches!(mode, ParallelismMode::Serial) {
            return CompilationPool::Serial { runner };
        }

        let worker_count = mode.worker_count(host_cpus);
        let pool = BlockingPool::new(worker_count, runtime.clone(), {
            let runner = Arc::clone(&runner);
            let runtime = runtime.clone();
            move |(job, invocation): CompileJob| {
                runtime.block_on(async {
                    let output = runner.run(&invocation).await?;
                    if output.exit_code != 0 {
                        return Err(CompileError::NonZeroExit { stderr: output.stderr });
                    }
                    let _ = &job;
                    Ok(())
                })
            }
        });

        CompilationPool::Pooled { pool }
    }

    /// Run every job in `jobs` to a terminal [`CompileStatus`], skipping
    /// jobs whose object file is already up to date. In pooled mode at
    /// most `worker_count` jobs are ever in flight at once; the wait for
    /// that batch to drain is re-checkpointed every
    /// [`CANCELLATION_CHECKPOINT`] so a job not yet handed to a worker can
    /// still be turned away. Once a job is in flight it is never
    /// interrupted — it finishes rather than being killed, matching the
    /// "no-kill of already-running compiler processes" rule in the spec.
    pub async fn run<B: InvocationBuilder>(
        &self,
        jobs: Vec<CompilationJob>,
        builder: &B,
        cancel: CancellationToken,
    ) -> Vec<(CompileJobId, CompileOutcome)> {
        let mut results = Vec::with_capacity(jobs.len());
        let mut pending = Vec::new();

        for job in jobs {
            if job.should_skip() {
                results.push((job.id, CompileOutcome::Skipped));
            } else {
                pending.push(job);
            }
        }

        match self {
            CompilationPool::Serial { runner } => {
                for job in pending {
                    if cancel.is_cancelled() {
                        results.push((job.id, CompileOutcome::Cancelled));
                        continue;
                    }
                    let invocation = builder.build(&job);
                    let outcome = run_one(runner.as_ref(), &invocation).await;
                    results.push((job.id, outcome));
                }
            }
            CompilationPool::Pooled { pool } => {
                // Keep at most `worker_count` jobs in flight at once rather
                // than handing the whole batch to the pool up front, so a
                // job that hasn't been handed to a worker yet can still be
                // turned away by a cancellation observed after this call
                // started. Draining is checkpointed every
                // `CANCELLATION_CHECKPOINT` (spec §4.7/§5 "pool wait loops
                // at ~500ms intervals") — the timeout elapsing does nothing
                // by itself, it just gives the next fill-up a chance to
                // re-read `cancel` before handing out more work. A job
                // already running is never touched by this; it finishes on
                // its own schedule.
                let worker_count = pool.worker_count();
                let mut remaining = pending.into_iter();
                let mut in_flight = FuturesUnordered::new();

                loop {
                    while in_flight.len() < worker_count && !cancel.is_cancelled() {
                        let Some(job) = remaining.next() else { break };
                        let invocation = builder.build(&job);
                        in_flight.push(async move {
                            let outcome = pool.submit((job.clone(), invocation)).await;
                            let outcome = match outcome {
                                Ok(()) => CompileOutcome::Compiled,
                                Err(CompileError::NonZeroExit { stderr }) => {
                                    CompileOutcome::Failed { message: stderr }
                                }
                                Err(e) => CompileOutcome::Failed { message: e.to_string() },
                            };
                            (job.id, outcome)
                        });
                    }

                    if in_flight.is_empty() {
                        break;
                    }

                    if let Ok(Some(result)) = tokio::time::timeout(CANCELLATION_CHECKPOINT, in_flight.next()).await {
                        results.push(result);
                    }
                }

                // Anything left in `remaining` was never handed to a
                // worker — the fill loop above stopped pulling from it
                // once `cancel` was observed. `cancel_all_pending` is the
                // same transition the dispatcher's own cancellation
                // checkpoint would apply to a batch it cancels wholesale,
                // so both paths agree on what "still queued" means.
                let mut still_queued: Vec<CompilationJob> = remaining.collect();
                self.cancel_all_pending(&mut still_queued);
                results.extend(still_queued.into_iter().map(|job| (job.id, CompileOutcome::Cancelled)));
            }
        }

        results
    }

    /// Transition every job in `queued` to [`CompileStatus::Cancelled`]
    /// without dispatching it. `run` calls this itself for whatever is
    /// left un-dispatched once `cancel` fires; it is also `pub` so a
    /// caller holding its own pre-planned batch (the dispatcher, between
    /// submission batches) can apply the same transition without waiting
    /// on a `run` call to notice. Jobs already in flight are untouched —
    /// they finish on their own and are never part of `queued`.
    pub fn cancel_all_pending(&self, queued: &mut [CompilationJob]) {
        for job in queued {
            job.status = CompileStatus::Cancelled;
        }
    }
}

async fn run_one(runner: &dyn ProcessRunner, invocation: &Invocation) -> CompileOutcome {
    match runner.run(invocation).await {
        Ok(output) if output.exit_code == 0 => CompileOutcome::Compiled,
        Ok(output) => CompileOutcome::Failed { message: output.stderr },
        Err(e) => CompileOutcome::Failed { message: e.to_string() },
    }
}

#[cfg(test)]
#[path = "compile_tests.rs"]
mod tests;
