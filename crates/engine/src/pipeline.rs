// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three-stage package install pipeline (spec §4.6): a DAG-scheduled
//! download → unpack → install flow over bounded worker pools, with
//! stage-specific retries, cache-hit short-circuiting, and cancellation
//! cleanup.
//!
//! Cache-hit semantics: a [`PackageTask`] may carry an expected
//! [`Fingerprint`] (supplied by the caller, e.g. from a project lockfile).
//! When present and already installed, the task skips straight to `done`
//! without touching the network or disk — the expected fingerprint is the
//! lookup key, and the fingerprint computed after extraction is compared
//! against it as a verification step (a mismatch is the "permanent
//! remote" error the spec's error table names). When no fingerprint is
//! supplied the task always installs and the computed fingerprint becomes
//! its identity for future reinstalls.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anvil_core::{
    CacheManifest, CancellationToken, Clock, Fingerprint, PackageTask, PackageTaskId, Stage,
    TaskFailureReason,
};
use anvil_adapters::archive::{self, ArchiveError};
use anvil_adapters::download::{DownloadError, Downloader};
use anvil_storage::{fingerprint_dir, PackageCache, StorageError};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::dag::{DagError, TaskGraph};
use crate::pool::BlockingPool;
use crate::progress::{ProgressEvent, ProgressSink, TaskProgress};
use crate::retry;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dag(#[from] DagError),
}

/// Worker counts for the three stage pools (spec §4.6 defaults: D=4, U=2, I=2).
#[derive(Debug, Clone, Copy)]
pub struct PoolSizes {
    pub download: usize,
    pub unpack: usize,
    pub install: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self { download: 4, unpack: 2, install: 2 }
    }
}

/// The outcome of one task's run through the pipeline.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Done { fingerprint: Fingerprint },
    Failed(TaskFailureReason),
    Cancelled,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub outcomes: HashMap<PackageTaskId, TaskOutcome>,
}

impl PipelineReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(|o| matches!(o, TaskOutcome::Done { .. }))
    }

    pub fn failed_tasks(&self) -> Vec<PackageTaskId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Failed(_)))
            .map(|(id, _)| *id)
            .collect()
    }
}

type DownloadJob = (String, PathBuf);
type DownloadResult = Result<u64, DownloadError>;
type UnpackJob = (PathBuf, PathBuf);
type UnpackResult = Result<usize, ArchiveError>;
type InstallJob = (PathBuf, CacheManifest);
type InstallResult = Result<PathBuf, StorageError>;

/// Everything the pipeline needs beyond the task list itself: the shared
/// cache, the download collaborator, worker pool sizes, a progress sink,
/// and a clock for manifest timestamps.
///
/// Always held behind an `Arc` (see [`PackagePipeline::new`]) so that the
/// per-task drivers spawned by [`PackagePipeline::run`] can own a handle
/// to it across an `.await` without borrowing from the caller's stack.
pub struct PackagePipeline<C: Clock> {
    cache: Arc<PackageCache>,
    download_pool: BlockingPool<DownloadJob, DownloadResult>,
    unpack_pool: BlockingPool<UnpackJob, UnpackResult>,
    install_pool: BlockingPool<InstallJob, InstallResult>,
    progress: Arc<dyn ProgressSink>,
    clock: C,
}

impl<C: Clock + 'static> PackagePipeline<C> {
    pub fn new(
        cache: Arc<PackageCache>,
        downloader: Arc<dyn Downloader>,
        sizes: PoolSizes,
        progress: Arc<dyn ProgressSink>,
        clock: C,
        runtime: tokio::runtime::Handle,
    ) -> Arc<Self> {
        let download_pool = BlockingPool::new(sizes.download, runtime.clone(), {
            let downloader = Arc::clone(&downloader);
            let runtime = runtime.clone();
            move |(url, dest): DownloadJob| runtime.block_on(downloader.download(&url, &dest))
        });
        let unpack_pool = BlockingPool::new(sizes.unpack, runtime.clone(), {
            move |(archive_path, dest_dir): UnpackJob| archive::unpack(&archive_path, &dest_dir)
        });
        let install_pool = BlockingPool::new(sizes.install, runtime, {
            let cache = Arc::clone(&cache);
            move |(staging_dir, manifest): InstallJob| cache.commit(&staging_dir, &manifest)
        });

        Arc::new(Self { cache, download_pool, unpack_pool, install_pool, progress, clock })
    }

    fn tmp_dir(&self) -> PathBuf {
        self.cache.root().join("tmp")
    }

    /// The downloaded archive's path. Keeps the URL's own file extension
    /// (rather than a generic one) because [`archive::unpack`] detects
    /// format from the destination path's suffix; the task id prefix
    /// keeps concurrent tasks' downloads from colliding in `tmp/`.
    fn download_path(&self, task: &PackageTask) -> PathBuf {
        let basename = task.fetch_url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("package.tar.gz");
        self.tmp_dir().join(format!("{}-{basename}", task.id))
    }

    fn staging_dir(&self, task_id: PackageTaskId) -> PathBuf {
        self.tmp_dir().join(format!("temp_extract_{task_id}"))
    }

    /// Run every task in `tasks` to a terminal stage, respecting the DAG,
    /// stage-specific retries, and `cancel`. Returns `Err` only for a
    /// submission-time defect (a dependency cycle or dangling reference);
    /// per-task failures are reported in [`PipelineReport`], not as an
    /// `Err` here, because a partial install still needs its successes
    /// recorded.
    pub async fn run(
        self: &Arc<Self>,
        tasks: Vec<PackageTask>,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let graph = TaskGraph::build(&tasks)?;
        let total = tasks.len();
        let by_id: HashMap<PackageTaskId, PackageTask> =
            tasks.into_iter().map(|t| (t.id, t)).collect();

        let mut done: HashSet<PackageTaskId> = HashSet::new();
        let mut dispatched: HashSet<PackageTaskId> = HashSet::new();
        let mut report = PipelineReport::default();

        let (tx, mut rx) = mpsc::channel::<(PackageTaskId, TaskOutcome)>(total.max(1));

        self.dispatch_ready(&graph, &by_id, &done, &mut dispatched, &cancel, tx.clone());
        if dispatched.is_empty() {
            // Cancelled before anything could be dispatched (or an empty
            // task list): nothing will ever arrive on `rx`, so sweep
            // whatever never got a chance to run as cancelled rather than
            // waiting on a channel no one will send on.
            for task_id in by_id.keys().copied() {
                report.outcomes.entry(task_id).or_insert(TaskOutcome::Cancelled);
            }
        }

        while report.outcomes.len() < total {
            let Some((id, outcome)) = rx.recv().await else { break };
            self.emit_summary(
                total,
                dispatched.len().saturating_sub(report.outcomes.len() + 1),
                report.outcomes.len() + 1,
            );

            match &outcome {
                TaskOutcome::Done { .. } => {
                    done.insert(id);
                }
                TaskOutcome::Failed(_) => {
                    self.poison_dependents(&graph, &by_id, id, &mut report, &mut dispatched);
                }
                TaskOutcome::Cancelled => {}
            }
            report.outcomes.insert(id, outcome);

            if !cancel.is_cancelled() {
                self.dispatch_ready(&graph, &by_id, &done, &mut dispatched, &cancel, tx.clone());
            } else {
                for task_id in by_id.keys().copied() {
                    if !dispatched.contains(&task_id) && !report.outcomes.contains_key(&task_id) {
                        report.outcomes.insert(task_id, TaskOutcome::Cancelled);
                    }
                }
            }
        }

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_ready(
        self: &Arc<Self>,
        graph: &TaskGraph,
        by_id: &HashMap<PackageTaskId, PackageTask>,
        done: &HashSet<PackageTaskId>,
        dispatched: &mut HashSet<PackageTaskId>,
        cancel: &CancellationToken,
        tx: mpsc::Sender<(PackageTaskId, TaskOutcome)>,
    ) {
        if cancel.is_cancelled() {
            return;
        }
        let pending = by_id.values().filter(|t| !dispatched.contains(&t.id));
        let ready = graph.ready(pending, done);
        for id in ready {
            dispatched.insert(id);
            let Some(task) = by_id.get(&id) else {
                unreachable!("ready id exists in by_id");
            };
            let task = task.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            let pipeline = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = pipeline.drive_task(task, cancel).await;
                let _ = tx.send((id, outcome)).await;
            });
        }
    }

    fn poison_dependents(
        &self,
        graph: &TaskGraph,
        by_id: &HashMap<PackageTaskId, PackageTask>,
        failed_id: PackageTaskId,
        report: &mut PipelineReport,
        dispatched: &mut HashSet<PackageTaskId>,
    ) {
        for dependent in graph.transitive_dependents(&failed_id) {
            if by_id.contains_key(&dependent) && !report.outcomes.contains_key(&dependent) {
                dispatched.insert(dependent);
                report.outcomes.insert(
                    dependent,
                    TaskOutcome::Failed(TaskFailureReason::DependencyFailed { upstream: failed_id }),
                );
            }
        }
    }

    fn emit_summary(&self, total: usize, active: usize, done: usize) {
        self.progress.emit(ProgressEvent::Summary { total, active, done });
    }

    fn report_stage(&self, task: &PackageTask, stage: Stage) {
        self.progress.emit(ProgressEvent::Task {
            task_id: task.id,
            name: task.name.clone(),
            version: task.version.clone(),
            stage,
            progress: None::<TaskProgress>,
        });
    }

    async fn drive_task(&self, mut task: PackageTask, cancel: CancellationToken) -> TaskOutcome {
        if let Some(expected) = task.fingerprint {
            if self.cache.is_installed(&expected) {
                self.report_stage(&task, Stage::Done);
                return TaskOutcome::Done { fingerprint: expected };
            }
        }

        if cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }

        self.report_stage(&task, Stage::Downloading);
        let download_path = self.download_path(&task);
        if let Err(reason) = self.download_with_retry(&mut task, &download_path).await {
            let _ = std::fs::remove_file(&download_path);
            return TaskOutcome::Failed(reason);
        }

        if cancel.is_cancelled() {
            let _ = std::fs::remove_file(&download_path);
            return TaskOutcome::Cancelled;
        }

        self.report_stage(&task, Stage::Unpacking);
        let staging_dir = self.staging_dir(task.id);
        if let Err(reason) = self.unpack_with_retry(&mut task, &download_path, &staging_dir).await {
            let _ = self.cache.discard_staging(&staging_dir);
            let _ = std::fs::remove_file(&download_path);
            return TaskOutcome::Failed(reason);
        }
        let _ = std::fs::remove_file(&download_path);

        if cancel.is_cancelled() {
            let _ = self.cache.discard_staging(&staging_dir);
            return TaskOutcome::Cancelled;
        }

        self.report_stage(&task, Stage::Installing);
        match self.install(&task, &staging_dir).await {
            Ok(fingerprint) => {
                self.report_stage(&task, Stage::Done);
                TaskOutcome::Done { fingerprint }
            }
            Err(reason) => {
                let _ = self.cache.discard_staging(&staging_dir);
                TaskOutcome::Failed(reason)
            }
        }
    }

    async fn download_with_retry(
        &self,
        task: &mut PackageTask,
        dest: &PathBuf,
    ) -> Result<(), TaskFailureReason> {
        loop {
            let result = self.download_pool.submit((task.fetch_url.clone(), dest.clone())).await;
            match result {
                Ok(_) => return Ok(()),
                Err(err) if !err.is_retryable() => {
                    return Err(TaskFailureReason::Permanent { message: err.to_string() });
                }
                Err(err) => {
                    task.retries.download_attempts += 1;
                    if task.retries.download_attempts >= retry::DOWNLOAD_MAX_ATTEMPTS {
                        return Err(TaskFailureReason::RetriesExhausted { message: err.to_string() });
                    }
                    tokio::time::sleep(retry::download_backoff(task.retries.download_attempts - 1)).await;
                }
            }
        }
    }

    async fn unpack_with_retry(
        &self,
        task: &mut PackageTask,
        archive_path: &PathBuf,
        dest_dir: &PathBuf,
    ) -> Result<(), TaskFailureReason> {
        loop {
            let result = self.unpack_pool.submit((archive_path.clone(), dest_dir.clone())).await;
            match result {
                Ok(_) => return Ok(()),
                Err(ArchiveError::Io { source, .. }) if source.kind() == std::io::ErrorKind::PermissionDenied => {
                    task.retries.unpack_attempts += 1;
                    if task.retries.unpack_attempts >= retry::UNPACK_MAX_ATTEMPTS {
                        return Err(TaskFailureReason::RetriesExhausted {
                            message: "permission denied unpacking archive".into(),
                        });
                    }
                    tokio::time::sleep(retry::UNPACK_RETRY_DELAY).await;
                }
                Err(err) => return Err(TaskFailureReason::Permanent { message: err.to_string() }),
            }
        }
    }

    async fn install(
        &self,
        task: &PackageTask,
        staging_dir: &PathBuf,
    ) -> Result<Fingerprint, TaskFailureReason> {
        let computed = fingerprint_dir(staging_dir)
            .map_err(|e| TaskFailureReason::Permanent { message: e.to_string() })?;

        if let Some(expected) = task.fingerprint {
            if expected != computed {
                return Err(TaskFailureReason::Permanent {
                    message: format!("fingerprint mismatch: expected {expected}, computed {computed}"),
                });
            }
        }

        let manifest = CacheManifest::new(
            task.name.clone(),
            "package",
            task.version.clone(),
            task.fetch_url.clone(),
            computed,
            self.clock.epoch_ms(),
        );

        self.install_pool
            .submit((staging_dir.clone(), manifest))
            .await
            .map_err(|e| TaskFailureReason::Permanent { message: e.to_string() })?;

        Ok(computed)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
