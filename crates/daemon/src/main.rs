// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `anvild`: the long-lived background coordinator (spec §4.1). Binds the
//! listening socket, assembles the three work engines and the dispatcher
//! that fronts them, and serves the HTTP/WebSocket surface until an idle
//! timeout or an explicit `/api/daemon/shutdown` fires.

mod bootstrap;
mod cancellation;
mod dispatcher;
mod endpoint;
mod env;
mod locks;

use std::sync::Arc;

use anvil_adapters::{HttpDownloader, RealProcessRunner};
use anvil_build::{AtmelAvr, BuildOrchestrator, Espressif32, PlatformRegistry};
use anvil_core::SystemClock;
use anvil_device::{DeviceCoordinator, TokioSerialPortFactory};
use anvil_engine::{PackagePipeline, PoolSizes};
use anvil_storage::PackageCache;
use dispatcher::{Dispatcher, RequestTables};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let startup = bootstrap::startup().await?;
    tracing::info!(addr = %startup.local_addr, "anvild listening");

    let project_dir = std::env::args().nth(1).map(std::path::PathBuf::from).unwrap_or(std::env::current_dir()?);

    let clock = SystemClock;
    let runtime = tokio::runtime::Handle::current();
    let cache = Arc::new(PackageCache::new(startup.paths.cache_dir.clone()));
    let downloader: Arc<dyn anvil_adapters::Downloader> = Arc::new(HttpDownloader::new());

    let (tables, progress_sink) = RequestTables::new();
    let pipeline = PackagePipeline::new(cache, downloader, PoolSizes::default(), progress_sink, clock.clone(), runtime.clone());

    let registry = PlatformRegistry::new(vec![Box::new(Espressif32), Box::new(AtmelAvr)]);
    let runner: Arc<dyn anvil_adapters::ProcessRunner> = Arc::new(RealProcessRunner::new());
    let host_cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let orchestrator = Arc::new(BuildOrchestrator::new(registry, runner, runtime, host_cpus));

    let devices = Arc::new(DeviceCoordinator::new(Arc::new(TokioSerialPortFactory::default())));

    let dispatcher = Arc::new(Dispatcher::new(orchestrator, pipeline, Arc::clone(&devices), clock, project_dir.clone(), tables));

    {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(env::stale_lock_sweep_interval());
            loop {
                ticks.tick().await;
                dispatcher.clear_stale_locks();
            }
        });
    }

    let platforms = Arc::new(PlatformRegistry::new(vec![Box::new(Espressif32), Box::new(AtmelAvr)]));
    let shutdown = Arc::new(Notify::new());
    let state = endpoint::DaemonState {
        dispatcher: Arc::clone(&dispatcher),
        platforms,
        build_root: project_dir.join(".anvil-build"),
        source_root: project_dir,
        shutdown: Arc::clone(&shutdown),
    };
    let app = endpoint::router(state);

    let serve = axum::serve(startup.listener, app);
    tokio::select! {
        result = serve => result?,
        () = endpoint::wait_for_shutdown(shutdown, move || dispatcher.active_requests()) => {}
    }

    bootstrap::publish_shutdown(&startup.paths);
    tracing::info!("anvild shutdown complete");
    Ok(())
}
