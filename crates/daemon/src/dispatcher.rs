// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request dispatcher (spec §4.5): the one place that assigns a
//! request id, derives its isolated [`BuildContext`], acquires the locks
//! its kind needs, registers the cancellation checkpoint, routes to the
//! kind-specific work, and publishes a terminal status on every exit path
//! — success, failure, or cancellation. Locks always release before the
//! terminal status publishes (spec §7's "locks release before terminal
//! status" rule), which [`LockBundle`]'s `Drop` gives for free.
//!
//! Grounded on the teacher's `ListenCtx`/`handle_request` routing table in
//! `listener/mod.rs` — one match arm per request kind, mutation helpers
//! grouped by entity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anvil_build::{BuildOrchestrator, BuildProgress, BuildRequest};
use anvil_core::{
    CallerIdentity, CancellationToken, Clock, DeviceSessionId, Environment, LockError,
    LockPolicy, LockStatus, ManifestError, ParallelismMode, ProjectManifest, Request, RequestId,
    RequestKind, RequestStatus, SystemClock,
};
use anvil_device::{
    run_crash_loop, AttemptOutcome, CrashLoopOutcome, DeviceCoordinator, RealSleeper,
    RealUploadProcess,
};
use anvil_engine::{PackagePipeline, PipelineError, ProgressEvent, ProgressSink, TaskOutcome};
use anvil_wire::status::TaskProgress as WireTaskProgress;
use anvil_wire::{DeviceInfo, StatusEvent};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::cancellation::{CancellationRegistry, LivenessProbe, ProcfsLivenessProbe};
use crate::env;
use crate::locks::{LockBundle, LockManager};

pub const STATUS_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("no upload port given and environment '{environment}' declares none")]
    NoPort { environment: String },
    #[error("no such request '{0}'")]
    UnknownRequest(RequestId),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

struct RequestEntry {
    status: RequestStatus,
    events: broadcast::Sender<StatusEvent>,
}

/// The result of driving a build/deploy request's install DAG (spec §5:
/// package-install completion happens-before source compilation) before
/// the orchestrator ever runs.
enum InstallPhaseOutcome {
    Succeeded,
    Cancelled,
    Failed(String),
}

/// The two tables a [`Dispatcher`] and its package pipeline's progress
/// routing both need to share. Built before the pipeline itself, since
/// [`PackagePipeline::new`] takes its [`ProgressSink`] at construction time
/// but that sink has to resolve task ids against the very request table
/// the (not-yet-built) `Dispatcher` will own — see `main`'s bootstrap order.
pub struct RequestTables {
    requests: Arc<Mutex<HashMap<RequestId, RequestEntry>>>,
    task_owner: Arc<Mutex<HashMap<anvil_core::PackageTaskId, RequestId>>>,
}

impl RequestTables {
    /// Build an empty pair of tables plus the [`ProgressSink`] that routes
    /// through them, ready to hand to [`PackagePipeline::new`] before the
    /// `Dispatcher` that will eventually own these same tables exists.
    pub fn new() -> (Self, Arc<dyn ProgressSink>) {
        let requests = Arc::new(Mutex::new(HashMap::new()));
        let task_owner = Arc::new(Mutex::new(HashMap::new()));
        let sink: Arc<dyn ProgressSink> =
            Arc::new(PipelineProgressRouter { requests: Arc::clone(&requests), task_owner: Arc::clone(&task_owner) });
        (Self { requests, task_owner }, sink)
    }
}

/// Everything one daemon instance needs to drive requests to completion:
/// the lock table, the cancellation registry, the three work engines, and
/// the table of in-flight requests a streaming reader attaches to.
pub struct Dispatcher {
    locks: LockManager<SystemClock>,
    cancellation: Arc<CancellationRegistry<ProcfsLivenessProbe>>,
    orchestrator: Arc<BuildOrchestrator>,
    pipeline: Arc<PackagePipeline<SystemClock>>,
    devices: Arc<DeviceCoordinator>,
    clock: SystemClock,
    start_time_ms: u64,
    pid: u32,
    project_dir: PathBuf,
    active: AtomicUsize,
    requests: Arc<Mutex<HashMap<RequestId, RequestEntry>>>,
    task_owner: Arc<Mutex<HashMap<anvil_core::PackageTaskId, RequestId>>>,
    monitor_ports: Mutex<HashMap<RequestId, String>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator: Arc<BuildOrchestrator>,
        pipeline: Arc<PackagePipeline<SystemClock>>,
        devices: Arc<DeviceCoordinator>,
        clock: SystemClock,
        project_dir: PathBuf,
        tables: RequestTables,
    ) -> Self {
        Self {
            locks: LockManager::new(clock.clone()),
            cancellation: Arc::new(CancellationRegistry::new(ProcfsLivenessProbe, env::cancellation_cache_ttl())),
            orchestrator,
            pipeline,
            devices,
            start_time_ms: clock.epoch_ms(),
            pid: std::process::id(),
            project_dir,
            active: AtomicUsize::new(0),
            requests: tables.requests,
            task_owner: tables.task_owner,
            monitor_ports: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn uptime_ms(&self) -> u64 {
        self.clock.epoch_ms().saturating_sub(self.start_time_ms)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn lock_status(&self) -> Vec<LockStatus> {
        self.locks.status()
    }

    /// Periodic safety-net sweep (spec §4.3 `clear_stale`, run "on
    /// dispatcher idle ticks"): drop any lock whose owning client pid is no
    /// longer alive. Ordinarily a dead client's lock is released promptly
    /// by its `LockBundle` dropping once the owning task observes
    /// cancellation; this catches the remainder — a task that never reached
    /// its own cancellation checkpoint, or a lock left behind by a panic.
    pub fn clear_stale_locks(&self) {
        let probe = ProcfsLivenessProbe;
        for name in self.locks.clear_stale(|pid| probe.is_alive(pid)) {
            warn!(lock = %name, "cleared stale lock owned by a dead pid");
        }
    }

    pub fn device_list(&self) -> Vec<DeviceInfo> {
        let locks = self.locks.status();
        anvil_device::list_available_ports()
            .into_iter()
            .map(|(port, description)| {
                let leased_by = locks.iter().find(|l| l.name == format!("device:{port}")).map(|l| l.owner_pid);
                DeviceInfo { port, description, leased_by }
            })
            .collect()
    }

    /// Explicit cancel signal, routed from `/api/requests/{id}/cancel`
    /// (or the CLI's Ctrl-C handler) into the registry.
    pub fn cancel(&self, request_id: RequestId) {
        self.cancellation.signal(request_id);
    }

    /// Attach to an in-flight (or just-finished) request's event stream.
    /// Returns `None` once the request has fully aged out of the table.
    pub fn subscribe(&self, request_id: RequestId) -> Option<broadcast::Receiver<StatusEvent>> {
        self.requests.lock().get(&request_id).map(|entry| entry.events.subscribe())
    }

    pub fn devices(&self) -> &Arc<DeviceCoordinator> {
        &self.devices
    }

    fn load_environment(&self, name: &str) -> Result<Environment, DispatchError> {
        let manifest_path = self.project_dir.join("anvil.toml");
        let manifest = ProjectManifest::load(&manifest_path)?;
        Ok(manifest.environment(name)?.clone())
    }

    fn register(&self, kind: RequestKind, caller_pid: u32) -> (RequestId, CancellationToken) {
        let request = Request::new(
            kind,
            CallerIdentity { pid: caller_pid, cwd: self.project_dir.clone() },
            serde_json::Value::Null,
            self.clock.epoch_ms(),
        );
        let (tx, _rx) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        self.requests.lock().insert(request.id, RequestEntry { status: RequestStatus::Running, events: tx });
        self.active.fetch_add(1, Ordering::AcqRel);
        let token = self.cancellation.register(request.id, caller_pid);
        (request.id, token)
    }

    fn publish(&self, request_id: RequestId, event: StatusEvent) {
        if let Some(entry) = self.requests.lock().get(&request_id) {
            let _ = entry.events.send(event);
        }
    }

    /// Mark a request terminal, publish its closing frame, release its
    /// tracking state, and schedule the entry's eventual removal so a
    /// subscriber arriving a moment late still observes `Terminal`
    /// instead of a 404.
    fn finish(&self, request_id: RequestId, status: RequestStatus, message: Option<String>) {
        if let Some(entry) = self.requests.lock().get_mut(&request_id) {
            entry.status = status;
        }
        self.publish(request_id, StatusEvent::terminal(status, message));
        self.cancellation.unregister(request_id);
        self.active.fetch_sub(1, Ordering::AcqRel);

        let requests = Arc::clone(&self.requests);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            requests.lock().remove(&request_id);
        });
    }

    /// Run `environment`'s install DAG to completion before a build or
    /// deploy is allowed to touch the compile pool (spec §5 ordering,
    /// §4.4 checkpoint (b), §8 scenarios 1 and 3). Unlike
    /// [`Dispatcher::submit_install_deps`] this request's policy is
    /// `cancellable`, so the real token is threaded straight through —
    /// a cancel observed mid-install stops dispatch of further tasks and
    /// the whole request ends `Cancelled`, never reaching the orchestrator.
    async fn run_install_phase(
        self: &Arc<Self>,
        request_id: RequestId,
        environment: &Environment,
        cancel: &CancellationToken,
    ) -> InstallPhaseOutcome {
        let tasks = anvil_build::plan_install_tasks(environment);
        {
            let mut owner = self.task_owner.lock();
            for task in &tasks {
                owner.insert(task.id, request_id);
            }
        }

        let report = match self.pipeline.run(tasks, cancel.clone()).await {
            Ok(report) => report,
            Err(err) => return InstallPhaseOutcome::Failed(err.to_string()),
        };

        if report.all_succeeded() {
            InstallPhaseOutcome::Succeeded
        } else if report.outcomes.values().any(|o| matches!(o, TaskOutcome::Cancelled)) {
            InstallPhaseOutcome::Cancelled
        } else {
            let failed = report.failed_tasks();
            InstallPhaseOutcome::Failed(format!("{} dependency task(s) failed", failed.len()))
        }
    }

    /// Submit a build (spec §4.2 `/api/build`). Returns the id a caller
    /// streams progress from via [`Dispatcher::subscribe`].
    pub fn submit_build(
        self: &Arc<Self>,
        caller_pid: u32,
        environment_name: String,
        profile: anvil_build::Profile,
        parallelism: ParallelismMode,
        extra_flags: Vec<String>,
        build_root: PathBuf,
        source_root: PathBuf,
    ) -> Result<RequestId, DispatchError> {
        let environment = self.load_environment(&environment_name)?;
        let (request_id, cancel) = self.register(RequestKind::Build, caller_pid);

        let mut bundle = LockBundle::new(&self.locks);
        if let Err(err) = bundle.acquire(&format!("env:{environment_name}"), caller_pid, LockPolicy::Wait) {
            self.finish(request_id, RequestStatus::Failed, Some(err.to_string()));
            return Err(err.into());
        }

        let this = Arc::clone(self);
        let project_dir = self.project_dir.clone();
        tokio::spawn(async move {
            let _bundle = bundle;

            match this.run_install_phase(request_id, &environment, &cancel).await {
                InstallPhaseOutcome::Succeeded => {}
                InstallPhaseOutcome::Cancelled => {
                    this.finish(request_id, RequestStatus::Cancelled, None);
                    return;
                }
                InstallPhaseOutcome::Failed(message) => {
                    warn!(request_id = %request_id, error = %message, "dependency install failed");
                    this.finish(request_id, RequestStatus::Failed, Some(message));
                    return;
                }
            }

            let request = BuildRequest {
                project_dir: project_dir.clone(),
                source_root,
                build_root,
                environment_name,
                environment,
                profile,
                parallelism,
                extra_flags,
            };
            let progress = ChannelProgress { dispatcher: Arc::clone(&this), request_id };
            match this.orchestrator.build_with_progress(&request, cancel, &progress).await {
                Ok(outcome) => {
                    info!(request_id = %request_id, artifact = %outcome.artifact_path.display(), "build succeeded");
                    this.finish(request_id, RequestStatus::Succeeded, None);
                }
                Err(anvil_build::BuildError::Cancelled) => {
                    this.finish(request_id, RequestStatus::Cancelled, None);
                }
                Err(err) => {
                    warn!(request_id = %request_id, error = %err, "build failed");
                    this.finish(request_id, RequestStatus::Failed, Some(err.to_string()));
                }
            }
        });

        Ok(request_id)
    }

    /// Submit a deploy (spec §4.2 `/api/deploy`, §4.8 preemption
    /// sequence): build first, then run the crash-loop-wrapped,
    /// watchdog-timed upload through the device coordinator's preemption
    /// path.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_deploy(
        self: &Arc<Self>,
        caller_pid: u32,
        environment_name: String,
        port_override: Option<String>,
        profile: anvil_build::Profile,
        build_root: PathBuf,
        source_root: PathBuf,
        platforms: Arc<anvil_build::PlatformRegistry>,
    ) -> Result<RequestId, DispatchError> {
        let environment = self.load_environment(&environment_name)?;
        let port = port_override
            .or_else(|| environment.upload_port.clone())
            .ok_or_else(|| DispatchError::NoPort { environment: environment_name.clone() })?;

        let (request_id, cancel) = self.register(RequestKind::Deploy, caller_pid);

        let mut bundle = LockBundle::new(&self.locks);
        if let Err(err) = bundle.acquire(&format!("env:{environment_name}"), caller_pid, LockPolicy::Wait) {
            self.finish(request_id, RequestStatus::Failed, Some(err.to_string()));
            return Err(err.into());
        }
        if let Err(err) = bundle.acquire(&format!("device:{port}"), caller_pid, LockPolicy::Preempt) {
            self.finish(request_id, RequestStatus::Failed, Some(err.to_string()));
            return Err(err.into());
        }

        let this = Arc::clone(self);
        let project_dir = self.project_dir.clone();
        tokio::spawn(async move {
            let _bundle = bundle;

            match this.run_install_phase(request_id, &environment, &cancel).await {
                InstallPhaseOutcome::Succeeded => {}
                InstallPhaseOutcome::Cancelled => {
                    this.finish(request_id, RequestStatus::Cancelled, None);
                    return;
                }
                InstallPhaseOutcome::Failed(message) => {
                    warn!(request_id = %request_id, error = %message, "dependency install failed");
                    this.finish(request_id, RequestStatus::Failed, Some(message));
                    return;
                }
            }

            let request = BuildRequest {
                project_dir: project_dir.clone(),
                source_root,
                build_root,
                environment_name,
                environment: environment.clone(),
                profile,
                parallelism: ParallelismMode::Default,
                extra_flags: Vec::new(),
            };
            let progress = ChannelProgress { dispatcher: Arc::clone(&this), request_id };
            let outcome = match this.orchestrator.build_with_progress(&request, cancel.clone(), &progress).await {
                Ok(outcome) => outcome,
                Err(anvil_build::BuildError::Cancelled) => {
                    this.finish(request_id, RequestStatus::Cancelled, None);
                    return;
                }
                Err(err) => {
                    this.finish(request_id, RequestStatus::Failed, Some(err.to_string()));
                    return;
                }
            };

            let Some(spec) = platforms.lookup(&environment.platform) else {
                this.finish(
                    request_id,
                    RequestStatus::Failed,
                    Some(format!("unknown platform '{}'", environment.platform)),
                );
                return;
            };

            let session = DeviceSessionId::new();
            let devices = Arc::clone(&this.devices);
            let artifact = outcome.artifact_path.clone();
            let env_for_upload = environment.clone();
            let port_for_upload = port.clone();
            let this_for_log = Arc::clone(&this);

            let deploy_result = devices
                .deploy(&port, session, move || async move {
                    run_crash_loop(
                        move |_attempt| {
                            let invocation = spec.upload_invocation(&env_for_upload, &artifact, &port_for_upload, &project_dir);
                            Box::pin(async move {
                                let Ok(mut process) = RealUploadProcess::spawn(&invocation) else {
                                    return AttemptOutcome::Failed { reason: "failed to spawn uploader".into() };
                                };
                                match anvil_device::run_with_watchdog(
                                    &mut process,
                                    env::upload_total_timeout(),
                                    env::upload_inactivity_timeout(),
                                )
                                .await
                                {
                                    anvil_device::WatchdogOutcome::Completed { exit_code: 0 } => AttemptOutcome::Established,
                                    anvil_device::WatchdogOutcome::Completed { exit_code } => {
                                        AttemptOutcome::Failed { reason: format!("uploader exited {exit_code}") }
                                    }
                                    anvil_device::WatchdogOutcome::InactivityTimeout => {
                                        AttemptOutcome::Failed { reason: "uploader produced no output".into() }
                                    }
                                    anvil_device::WatchdogOutcome::TotalTimeout => {
                                        AttemptOutcome::Failed { reason: "uploader exceeded its time budget".into() }
                                    }
                                }
                            })
                        },
                        move |attempt, outcome| {
                            this_for_log.publish(
                                request_id,
                                StatusEvent::Log { line: format!("deploy attempt {attempt}: {outcome:?}") },
                            );
                        },
                        &RealSleeper,
                    )
                    .await
                })
                .await;

            match deploy_result {
                Ok((_preempted, CrashLoopOutcome::Established { .. })) => {
                    this.finish(request_id, RequestStatus::Succeeded, None);
                }
                Ok((_preempted, CrashLoopOutcome::ExhaustedAttempts { last_reason, .. })) => {
                    this.finish(request_id, RequestStatus::Failed, Some(last_reason));
                }
                Err(err) => {
                    this.finish(request_id, RequestStatus::Failed, Some(err.to_string()));
                }
            }
        });

        Ok(request_id)
    }

    /// Submit an install-deps run (spec §4.2 `/api/install-deps`, §4.6
    /// pipeline). Cancellation policy is `continue` (spec §4.4): the
    /// registry still reports this request as cancelled to anyone polling
    /// its status, but the pipeline itself runs every task to completion
    /// regardless, so the shared cache is populated even if the original
    /// caller lost interest or died. The registry's own token (`_cancel`)
    /// is registered for observability only; the pipeline is driven by a
    /// token of its own that nothing ever signals.
    pub fn submit_install_deps(self: &Arc<Self>, caller_pid: u32, environment_name: String) -> Result<RequestId, DispatchError> {
        let environment = self.load_environment(&environment_name)?;
        let (request_id, _cancel) = self.register(RequestKind::InstallDependencies, caller_pid);
        debug_assert_eq!(RequestKind::InstallDependencies.cancellation_policy(), anvil_core::CancellationPolicy::Continue);

        let mut bundle = LockBundle::new(&self.locks);
        if let Err(err) = bundle.acquire(&format!("env:{environment_name}"), caller_pid, LockPolicy::Wait) {
            self.finish(request_id, RequestStatus::Failed, Some(err.to_string()));
            return Err(err.into());
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _bundle = bundle;
            let tasks = anvil_build::plan_install_tasks(&environment);
            {
                let mut owner = this.task_owner.lock();
                for task in &tasks {
                    owner.insert(task.id, request_id);
                }
            }

            let runs_to_completion = CancellationToken::new();
            let report = match this.pipeline.run(tasks, runs_to_completion).await {
                Ok(report) => report,
                Err(err) => {
                    this.finish(request_id, RequestStatus::Failed, Some(err.to_string()));
                    return;
                }
            };

            if report.all_succeeded() {
                this.finish(request_id, RequestStatus::Succeeded, None);
            } else {
                let failed = report.failed_tasks();
                this.finish(request_id, RequestStatus::Failed, Some(format!("{} task(s) failed", failed.len())));
            }
        });

        Ok(request_id)
    }

    /// Submit a monitor session (spec §4.2 `/api/monitor`). Unlike build
    /// and deploy, the bulk of the work happens after the caller upgrades
    /// the returned stream URL to a WebSocket — submission here only
    /// validates the port and records the session the endpoint layer
    /// drives, mirroring `/api/deploy`'s split between "accepted" and
    /// "streaming" concerns without duplicating the lease logic.
    pub fn submit_monitor(&self, caller_pid: u32, port: String) -> RequestId {
        let (request_id, _cancel) = self.register(RequestKind::Monitor, caller_pid);
        let _ = self.devices.ensure_open(&port);
        self.monitor_ports.lock().insert(request_id, port);
        request_id
    }

    /// Look up the port a `/api/monitor` submission was accepted for, so
    /// the endpoint layer can hand the upgraded WebSocket to the device
    /// coordinator without the client repeating the port in the URL.
    pub fn monitor_port(&self, request_id: RequestId) -> Option<String> {
        self.monitor_ports.lock().get(&request_id).cloned()
    }

    pub fn request_status(&self, request_id: RequestId) -> Option<RequestStatus> {
        self.requests.lock().get(&request_id).map(|e| e.status)
    }
}

/// Routes [`anvil_build::BuildProgress`] callbacks into a request's
/// status stream as [`StatusEvent::CompileUnit`] frames.
struct ChannelProgress {
    dispatcher: Arc<Dispatcher>,
    request_id: RequestId,
}

impl BuildProgress for ChannelProgress {
    fn compile_unit(&self, source: &Path, skipped: bool) {
        self.dispatcher.publish(
            self.request_id,
            StatusEvent::CompileUnit { source: source.to_string_lossy().into_owned(), skipped },
        );
    }

    fn log(&self, line: &str) {
        self.dispatcher.publish(self.request_id, StatusEvent::Log { line: line.to_string() });
    }
}

/// Routes [`anvil_engine::ProgressEvent`]s from the (daemon-wide, shared)
/// package pipeline into the status stream of whichever request currently
/// owns the task the event is about.
struct PipelineProgressRouter {
    requests: Arc<Mutex<HashMap<RequestId, RequestEntry>>>,
    task_owner: Arc<Mutex<HashMap<anvil_core::PackageTaskId, RequestId>>>,
}

impl ProgressSink for PipelineProgressRouter {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Task { task_id, name, version, stage, progress } => {
                let Some(request_id) = self.task_owner.lock().get(&task_id).copied() else { return };
                let wire_progress = progress.map(|p| match p {
                    anvil_engine::TaskProgress::Percent(value) => WireTaskProgress::Percent { value },
                    anvil_engine::TaskProgress::Text(value) => WireTaskProgress::Text { value },
                });
                if let Some(entry) = self.requests.lock().get(&request_id) {
                    let _ = entry.events.send(StatusEvent::PackageTask { task_id, name, version, stage, progress: wire_progress });
                }
            }
            ProgressEvent::Summary { total, active, done } => {
                let owners: std::collections::HashSet<RequestId> = self.task_owner.lock().values().copied().collect();
                let requests = self.requests.lock();
                for request_id in owners {
                    if let Some(entry) = requests.get(&request_id) {
                        let _ = entry.events.send(StatusEvent::PackageSummary { total, active, done });
                    }
                }
            }
        }
    }
}
