// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locate a running `anvild`, or start one and wait for it to come up.
//!
//! Grounded on the reference pack's `coordinator-discovery.rs`: probe first,
//! race the spawn behind a file lock, double-check after winning the race,
//! poll for readiness instead of assuming the child is up the instant
//! `spawn()` returns. The liveness probe here is an HTTP health check
//! against `/api/daemon/status` rather than a Unix-socket ping, since this
//! daemon speaks HTTP, and readiness means "the port file names a socket
//! that answers", not "the socket path exists".

use std::io::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;

use crate::env::{self, EnvError};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("failed to locate the anvild binary")]
    BinaryNotFound,
    #[error("failed to spawn anvild: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("anvild did not become ready within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A located daemon: its base URL and the pid it reported.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    pub base_url: String,
    pub pid: u32,
}

/// Locate a running daemon, starting one if none answers. Mirrors
/// `ensure_coordinator_running`: probe, and only take the spawn path if the
/// probe comes back empty or stale.
pub async fn connect_or_start() -> Result<DaemonHandle, BootstrapError> {
    if let Some(handle) = probe().await {
        return Ok(handle);
    }
    spawn_and_wait().await
}

/// Probe without spawning. Used by read-only commands (`status`, `devices
/// list`) that should report "not running" rather than starting a daemon
/// just to answer a query.
pub async fn probe() -> Option<DaemonHandle> {
    let port_path = env::port_path().ok()?;
    let contents = tokio::fs::read_to_string(&port_path).await.ok()?;
    let mut lines = contents.lines();
    let port: u16 = lines.next()?.trim().parse().ok()?;
    let base_url = format!("http://127.0.0.1:{port}");
    let pid = health_check(&base_url).await?;
    Some(DaemonHandle { base_url, pid })
}

/// GET `/api/daemon/status` with a short timeout; returns the daemon's pid
/// so callers don't need a second round trip just to confirm liveness.
async fn health_check(base_url: &str) -> Option<u32> {
    let client = reqwest::Client::builder().timeout(Duration::from_millis(500)).build().ok()?;
    let resp = client.get(format!("{base_url}/api/daemon/status")).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let body: anvil_wire::Response = resp.json().await.ok()?;
    match body {
        anvil_wire::Response::Ok { value } => {
            let status: anvil_wire::query::DaemonStatus = serde_json::from_value(value).ok()?;
            Some(status.pid)
        }
        anvil_wire::Response::Error { .. } => None,
    }
}

const RETRY_BACKOFFS: [Duration; 3] = [Duration::ZERO, Duration::from_millis(500), Duration::from_secs(2)];
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_POLL_ATTEMPTS: u32 = 120;

async fn spawn_and_wait() -> Result<DaemonHandle, BootstrapError> {
    let lock_path = env::singleton_lock_path()?;
    if let Some(parent) = lock_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let _guard = acquire_spawn_lock(&lock_path)?;

    // Someone else may have won the race and started a daemon while we
    // waited for the lock.
    if let Some(handle) = probe().await {
        return Ok(handle);
    }

    let mut last_err = None;
    for backoff in RETRY_BACKOFFS {
        if !backoff.is_zero() {
            tokio::time::sleep(backoff).await;
        }
        match try_spawn_once().await {
            Ok(handle) => return Ok(handle),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or(BootstrapError::Timeout(Duration::from_secs(12))))
}

async fn try_spawn_once() -> Result<DaemonHandle, BootstrapError> {
    let binary = find_anvild_binary()?;
    let mut child = tokio::process::Command::new(&binary)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(BootstrapError::Spawn)?;
    let pid = child.id().unwrap_or(0);
    log_spawn_attempt(&binary, pid);

    // The child is detached from our wait loop on purpose: `anvild` daemonizes
    // itself (idle-eviction, not parent-lifetime), so we poll its externally
    // visible readiness signal (the port file + health check) rather than
    // synchronizing on the child handle. Reap it eagerly so it doesn't become
    // a zombie if it exits immediately (bad binary, port already taken, etc).
    let _ = child.try_wait();

    for _ in 0..READY_POLL_ATTEMPTS {
        tokio::time::sleep(READY_POLL_INTERVAL).await;
        if let Some(handle) = probe().await {
            return Ok(handle);
        }
    }
    Err(BootstrapError::Timeout(READY_POLL_INTERVAL * READY_POLL_ATTEMPTS))
}

/// Locate the `anvild` binary next to the running `anvil` executable first
/// (the common install layout), falling back to `PATH`.
fn find_anvild_binary() -> Result<PathBuf, BootstrapError> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("anvild");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }
    Ok(PathBuf::from("anvild"))
}

fn log_spawn_attempt(binary: &std::path::Path, pid: u32) {
    let Ok(path) = env::spawn_log_path() else { return };
    let Some(parent) = path.parent() else { return };
    if std::fs::create_dir_all(parent).is_err() {
        return;
    }
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(file, "{} spawned {} (pid {})", chrono::Utc::now().to_rfc3339(), binary.display(), pid);
    }
}

struct SpawnLockGuard {
    path: PathBuf,
    file: std::fs::File,
}

impl Drop for SpawnLockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// File-lock the spawner race so two `anvil` invocations racing to start a
/// daemon don't both spawn one; loses gracefully to a stale lock left behind
/// by a process that crashed mid-spawn.
fn acquire_spawn_lock(path: &std::path::Path) -> Result<SpawnLockGuard, BootstrapError> {
    for attempt in 0..10 {
        match std::fs::OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => return Ok(SpawnLockGuard { path: path.to_path_buf(), file }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if let Ok(meta) = std::fs::metadata(path) {
                    if let Ok(modified) = meta.modified() {
                        if modified.elapsed().unwrap_or(Duration::ZERO) > Duration::from_secs(30) {
                            let _ = std::fs::remove_file(path);
                            continue;
                        }
                    }
                }
                if attempt + 1 < 10 {
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
            Err(err) => return Err(BootstrapError::Io(err)),
        }
    }
    Err(BootstrapError::Timeout(Duration::from_secs(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial(anvil_dev_env)]
    fn probe_returns_none_when_no_port_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("ANVIL_STATE_DIR", dir.path());
        let result = tokio::runtime::Runtime::new().unwrap().block_on(probe());
        assert!(result.is_none());
        std::env::remove_var("ANVIL_STATE_DIR");
    }

    #[test]
    fn acquire_spawn_lock_removes_a_stale_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("daemon.lock");
        std::fs::write(&lock_path, b"stale").unwrap();
        let old = std::time::SystemTime::now() - Duration::from_secs(60);
        let file = std::fs::File::open(&lock_path).unwrap();
        file.set_modified(old).unwrap();
        drop(file);

        let guard = acquire_spawn_lock(&lock_path);
        assert!(guard.is_ok());
    }

    #[test]
    fn acquire_spawn_lock_fails_while_a_fresh_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("daemon.lock");
        let _held = std::fs::OpenOptions::new().write(true).create_new(true).open(&lock_path).unwrap();
        // A held lock is both `create_new`-blocked and fresh, so every retry
        // exhausts without ever treating it as stale.
        let result = acquire_spawn_lock(&lock_path);
        assert!(result.is_err());
    }
}
