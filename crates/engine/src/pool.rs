// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A bounded pool of OS threads bridged into the async world.
//!
//! The package pipeline's three stages and the compilation pool all need
//! the same shape: a fixed number of worker threads (spec §4.6's `D`/`U`/`I`
//! and §4.7's "parallel OS threads"), each capable of running blocking or
//! `block_on`-able work, fed by many concurrent async callers and drained
//! one job at a time per thread. `BlockingPool` is that shape, written
//! once and reused by [`crate::pipeline`] and [`crate::compile`].
//!
//! Jobs are submitted through a `std::sync::mpsc` channel (a worker thread
//! blocks on `recv()`, exactly the primitive it would use if it weren't
//! touching async code at all) and each job carries a `tokio::sync::oneshot`
//! sender so the async caller can simply `.await` its own result — that
//! oneshot recv is the "Tokio task draining a completion channel" the
//! design notes describe, not a second channel per stage.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::oneshot;

type Job<I, O> = (I, oneshot::Sender<O>);

/// A fixed-size pool of worker threads, each running `work` against
/// whatever input it is handed. `work` must be `Fn` (not `FnMut`) because
/// every worker thread shares the same closure.
pub struct BlockingPool<I, O> {
    tx: std_mpsc::Sender<Job<I, O>>,
    workers: Vec<JoinHandle<()>>,
}

impl<I, O> BlockingPool<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Spawn `worker_count` OS threads, each running `work` for every job
    /// it is handed. `runtime` lets a worker thread call back into async
    /// adapters (the downloader, the process runner) via `block_on`
    /// without needing its own Tokio runtime.
    pub fn new<F>(worker_count: usize, runtime: tokio::runtime::Handle, work: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        let worker_count = worker_count.max(1);
        let (tx, rx) = std_mpsc::channel::<Job<I, O>>();
        let rx = Arc::new(parking_lot::Mutex::new(rx));
        let work = Arc::new(work);

        let workers = (0..worker_count)
            .map(|_| {
                let rx = Arc::clone(&rx);
                let work = Arc::clone(&work);
                let runtime = runtime.clone();
                std::thread::spawn(move || loop {
                    let job = {
                        let rx = rx.lock();
                        rx.recv()
                    };
                    let Ok((input, respond)) = job else { break };
                    let _guard = runtime.enter();
                    let output = work(input);
                    let _ = respond.send(output);
                })
            })
            .collect();

        Self { tx, workers }
    }

    /// Submit one job and await its result. Dispatch is non-blocking
    /// (the channel send only blocks if every worker's queue slot is
    /// full, which `std::sync::mpsc` never enforces — backpressure is
    /// purely "jobs pile up waiting for a free worker"); waiting for the
    /// result is what callers checkpoint cancellation around.
    pub async fn submit(&self, input: I) -> O {
        let (respond, recv) = oneshot::channel();
        // A send error means every worker thread has exited (pool
        // shutting down); the caller's `recv` will then resolve to a
        // `RecvError`, which we turn into a panic here since a submit
        // after shutdown is a programming error, not a runtime one.
        if self.tx.send((input, respond)).is_err() {
            unreachable!("BlockingPool worker threads exited unexpectedly");
        }
        match recv.await {
            Ok(output) => output,
            Err(_) => unreachable!("BlockingPool worker dropped the response sender"),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl<I, O> Drop for BlockingPool<I, O> {
    fn drop(&mut self) {
        // Dropping `tx` (implicitly, as a field) closes the channel so
        // every worker's `recv()` returns `Err` and the loop exits. We
        // don't join the threads here — a compile/install worker mid-job
        // finishes on its own schedule, matching the spec's "in-flight
        // jobs are allowed to finish rather than forcibly killed".
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submits_run_on_worker_threads_and_return_results() {
        let handle = tokio::runtime::Handle::current();
        let pool: BlockingPool<u32, u32> = BlockingPool::new(2, handle, |n| n * 2);
        let results = futures_join(&pool, vec![1, 2, 3, 4]).await;
        assert_eq!(results, vec![2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn worker_count_is_at_least_one() {
        let handle = tokio::runtime::Handle::current();
        let pool: BlockingPool<u32, u32> = BlockingPool::new(0, handle, |n| n);
        assert_eq!(pool.worker_count(), 1);
    }

    async fn futures_join(pool: &BlockingPool<u32, u32>, inputs: Vec<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        for i in inputs {
            out.push(pool.submit(i).await);
        }
        out
    }
}
