// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The build orchestrator itself (spec §4.9 steps 1-7): ties source
//! discovery, translation-unit planning, the shared compilation pool, the
//! link step, post-processing, and per-profile artifact layout into one
//! polymorphic-over-platform driver.
//!
//! The orchestrator never branches on platform name — it looks up a
//! [`PlatformSpec`] once and calls through the uniform trait signature for
//! every remaining step, exactly the dispatch discipline spec §8's
//! conformance check exists to guarantee.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anvil_adapters::toolchain::ProcessRunner;
use anvil_adapters::{Invocation, SpawnError};
use anvil_core::{CancellationToken, CompilationJob, CompileJobId, Environment, ParallelismMode};
use anvil_engine::{CompilationPool, CompileOutcome, InvocationBuilder};
use thiserror::Error;

use crate::artifacts::{ArtifactLayout, Profile};
use crate::discover::{discover_sources, plan_translation_units};
use crate::platform::{PlatformRegistry, PlatformSpec};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unknown platform '{platform}'")]
    UnknownPlatform { platform: String },
    #[error("build was cancelled")]
    Cancelled,
    #[error("{} translation unit(s) failed to compile", failures.len())]
    Compile { failures: Vec<(PathBuf, String)> },
    #[error("link step failed: {0}")]
    Link(#[source] LinkError),
    #[error("post-process step failed: {0}")]
    PostProcess(#[source] LinkError),
    #[error("failed to write artifact to {path}: {source}")]
    Artifact { path: PathBuf, source: std::io::Error },
}

/// A link or post-process invocation that ran but misbehaved — either the
/// spawn itself failed, or the tool exited nonzero.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("exited with a nonzero status: {stderr}")]
    NonZeroExit { stderr: String },
}

/// Everything the orchestrator needs for one build, independent of which
/// platform backs `environment.platform` — the lookup happens inside
/// [`BuildOrchestrator::build`].
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project_dir: PathBuf,
    pub source_root: PathBuf,
    pub build_root: PathBuf,
    pub environment_name: String,
    pub environment: Environment,
    pub profile: Profile,
    pub parallelism: ParallelismMode,
    pub extra_flags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub image_path: PathBuf,
    pub artifact_path: PathBuf,
    pub compiled: usize,
    pub skipped: usize,
}

/// Progress hook the daemon's dispatcher implements to translate build
/// steps into wire [`anvil_wire::StatusEvent`]s. `anvil-build` itself
/// knows nothing about HTTP or WebSockets; it only calls these hooks as
/// each step completes.
pub trait BuildProgress: Send + Sync {
    fn compile_unit(&self, _source: &Path, _skipped: bool) {}
    fn log(&self, _line: &str) {}
}

/// A progress sink that does nothing, used by [`BuildOrchestrator::build`]
/// so callers that don't care about streaming progress don't pay for a
/// trait object.
struct NullBuildProgress;
impl BuildProgress for NullBuildProgress {}

struct PlatformInvocationBuilder<'a> {
    spec: &'a dyn PlatformSpec,
    env: &'a Environment,
    project_dir: &'a Path,
}

impl InvocationBuilder for PlatformInvocationBuilder<'_> {
    fn build(&self, job: &CompilationJob) -> Invocation {
        self.spec.compile_invocation(self.env, &job.source, &job.object, self.project_dir)
    }
}

pub struct BuildOrchestrator {
    registry: PlatformRegistry,
    runner: Arc<dyn ProcessRunner>,
    runtime: tokio::runtime::Handle,
    host_cpus: usize,
}

impl BuildOrchestrator {
    pub fn new(
        registry: PlatformRegistry,
        runner: Arc<dyn ProcessRunner>,
        runtime: tokio::runtime::Handle,
        host_cpus: usize,
    ) -> Self {
        Self { registry, runner, runtime, host_cpus }
    }

    /// Run a single build to completion, or stop at the first cancellation
    /// checkpoint, compile failure, link failure, or post-process failure.
    pub async fn build(&self, request: &BuildRequest, cancel: CancellationToken) -> Result<BuildOutcome, BuildError> {
        self.build_inner(request, cancel, &NullBuildProgress).await
    }

    /// Same as [`Self::build`], but calls `progress` as each translation
    /// unit finishes compiling. The daemon's dispatcher uses this to turn
    /// compile steps into streamed wire events; direct callers that don't
    /// care about per-unit progress should keep using [`Self::build`].
    pub async fn build_with_progress(
        &self,
        request: &BuildRequest,
        cancel: CancellationToken,
        progress: &dyn BuildProgress,
    ) -> Result<BuildOutcome, BuildError> {
        self.build_inner(request, cancel, progress).await
    }

    async fn build_inner(
        &self,
        request: &BuildRequest,
        cancel: CancellationToken,
        progress: &dyn BuildProgress,
    ) -> Result<BuildOutcome, BuildError> {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let spec = self
            .registry
            .lookup(&request.environment.platform)
            .ok_or_else(|| BuildError::UnknownPlatform { platform: request.environment.platform.clone() })?;

        let layout = ArtifactLayout::new(&request.build_root, &request.environment_name, &request.profile);
        let object_dir = layout.object_dir();

        let sources = discover_sources(&request.source_root);
        let jobs = plan_translation_units(
            &sources,
            &request.source_root,
            &object_dir,
            &request.environment,
            &request.extra_flags,
        );
        let objects: Vec<(CompileJobId, PathBuf)> = jobs.iter().map(|j| (j.id, j.object.clone())).collect();
        let sources_by_id: std::collections::HashMap<CompileJobId, PathBuf> =
            jobs.iter().map(|j| (j.id, j.source.clone())).collect();

        let pool = CompilationPool::new(request.parallelism, self.host_cpus, Arc::clone(&self.runner), self.runtime.clone());
        let invocation_builder =
            PlatformInvocationBuilder { spec, env: &request.environment, project_dir: &request.project_dir };
        let results = pool.run(jobs, &invocation_builder, cancel.clone()).await;

        let mut failures = Vec::new();
        let mut cancelled = false;
        let mut compiled = 0;
        let mut skipped = 0;
        for (id, outcome) in &results {
            let source = sources_by_id.get(id).cloned().unwrap_or_default();
            match outcome {
                CompileOutcome::Compiled => {
                    compiled += 1;
                    progress.compile_unit(&source, false);
                }
                CompileOutcome::Skipped => {
                    skipped += 1;
                    progress.compile_unit(&source, true);
                }
                CompileOutcome::Cancelled => cancelled = true,
                CompileOutcome::Failed { message } => {
                    failures.push((source, message.clone()));
                }
            }
        }

        if !failures.is_empty() {
            return Err(BuildError::Compile { failures });
        }
        if cancelled || cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let linked_objects: Vec<PathBuf> = objects.into_iter().map(|(_, path)| path).collect();
        let object_refs: Vec<&Path> = linked_objects.iter().map(PathBuf::as_path).collect();
        let image_path = layout.image_path();

        let link_invocation = spec.link_invocation(&request.environment, &object_refs, &image_path, &request.project_dir);
        run_to_success(self.runner.as_ref(), &link_invocation).await.map_err(BuildError::Link)?;

        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let artifact_path = layout.artifact_path(&spec.artifact_file_name(&request.environment));
        match spec.post_process_invocation(&request.environment, &image_path, &artifact_path, &request.project_dir) {
            Some(invocation) => {
                run_to_success(self.runner.as_ref(), &invocation).await.map_err(BuildError::PostProcess)?;
            }
            None if artifact_path != image_path => {
                if let Some(parent) = artifact_path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|source| BuildError::Artifact { path: artifact_path.clone(), source })?;
                }
                std::fs::copy(&image_path, &artifact_path)
                    .map_err(|source| BuildError::Artifact { path: artifact_path.clone(), source })?;
            }
            None => {}
        }

        Ok(BuildOutcome { image_path, artifact_path, compiled, skipped })
    }
}

async fn run_to_success(runner: &dyn ProcessRunner, invocation: &Invocation) -> Result<(), LinkError> {
    let output = runner.run(invocation).await?;
    if output.exit_code != 0 {
        return Err(LinkError::NonZeroExit { stderr: output.stderr });
    }
    Ok(())
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
