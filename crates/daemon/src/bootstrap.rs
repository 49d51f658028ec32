// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-side singleton bootstrap (spec §4.1): acquire the instance lock
//! first so a race between two spawned daemons resolves without relying on
//! bind failure, create every directory the rest of startup needs, and
//! only bind the actual listening socket once every fallible step ahead of
//! it has succeeded — mirroring the teacher's lock-first/dirs-early/
//! bind-last sequencing in `lifecycle::startup`, minus the WAL/snapshot
//! replay machinery this system has no equivalent of (build/device state
//! is not durable across a daemon restart; only the package cache on disk
//! is).

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;

use fs2::FileExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::env;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not determine a state directory (no ANVIL_STATE_DIR, XDG_STATE_HOME, or $HOME)")]
    NoStateDir,
    #[error("another anvild instance already holds the lock at {0}")]
    LockHeld(PathBuf),
    #[error("failed to bind {addr}: {source}")]
    BindFailed { addr: SocketAddr, source: std::io::Error },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Directories and files this daemon instance owns, resolved once at
/// startup under the state directory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub port_path: PathBuf,
    pub log_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Paths {
    pub fn resolve() -> Result<Self, BootstrapError> {
        let state_dir = env::state_dir()?;
        let cache_dir = env::cache_dir()?;
        Ok(Self {
            lock_path: state_dir.join("daemon.lock"),
            port_path: state_dir.join("daemon.port"),
            log_dir: state_dir.join("logs"),
            state_dir,
            cache_dir,
        })
    }
}

/// Holds the instance lock file open for the daemon's lifetime; dropping
/// this releases the OS-level advisory lock.
pub struct InstanceLock {
    _file: std::fs::File,
}

/// Everything `startup` hands back to `main`: the bound listener, the
/// resolved paths, and the held instance lock (keep it alive for the
/// process lifetime).
pub struct StartupResult {
    pub listener: TcpListener,
    pub local_addr: SocketAddr,
    pub paths: Paths,
    pub lock: InstanceLock,
}

/// Run the full bootstrap sequence. On any failure after the lock is held,
/// the port file is removed before returning — never on a lock failure,
/// since those files belong to the instance that is already running.
pub async fn startup() -> Result<StartupResult, BootstrapError> {
    let paths = Paths::resolve()?;
    match startup_inner(&paths).await {
        Ok((listener, local_addr, lock)) => Ok(StartupResult { listener, local_addr, paths, lock }),
        Err(err) => {
            if !matches!(err, BootstrapError::LockHeld(_)) {
                let _ = std::fs::remove_file(&paths.port_path);
            }
            Err(err)
        }
    }
}

async fn startup_inner(paths: &Paths) -> Result<(TcpListener, SocketAddr, InstanceLock), BootstrapError> {
    std::fs::create_dir_all(&paths.state_dir)?;

    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&paths.lock_path)?;
    lock_file.try_lock_exclusive().map_err(|_| BootstrapError::LockHeld(paths.lock_path.clone()))?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    std::fs::create_dir_all(&paths.log_dir)?;
    std::fs::create_dir_all(&paths.cache_dir)?;

    let addr = SocketAddr::from(([127, 0, 0, 1], env::requested_port()));
    let listener = TcpListener::bind(addr).await.map_err(|source| BootstrapError::BindFailed { addr, source })?;
    let local_addr = listener.local_addr()?;

    std::fs::write(&paths.port_path, format!("{}\n{}\n", local_addr.port(), std::process::id()))?;
    info!(port = local_addr.port(), pid = std::process::id(), "anvild bootstrap complete");

    Ok((listener, local_addr, InstanceLock { _file: lock_file }))
}

/// Remove the published port file, releasing the advertised address. Called
/// on clean shutdown, after the listener is already dropped.
pub fn publish_shutdown(paths: &Paths) {
    let _ = std::fs::remove_file(&paths.port_path);
}

/// Spawns the idle eviction watchdog: once `active_requests` reports zero
/// for a continuous `idle_timeout`, the returned future resolves and the
/// caller should shut the daemon down. Reset to zero elapsed every time a
/// request is observed active, mirroring a debounce rather than a fixed
/// wall-clock deadline.
pub async fn wait_for_idle_eviction(active_requests: impl Fn() -> usize, idle_timeout: std::time::Duration) {
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        if active_requests() != 0 {
            continue;
        }
        let mut idle_for = std::time::Duration::from_secs(1);
        while idle_for < idle_timeout {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            if active_requests() != 0 {
                break;
            }
            idle_for += std::time::Duration::from_secs(1);
        }
        if idle_for >= idle_timeout && active_requests() == 0 {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_second_lock_acquisition_fails_while_the_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("daemon.lock");
        let first = std::fs::OpenOptions::new().write(true).create(true).open(&lock_path).unwrap();
        first.try_lock_exclusive().unwrap();

        let second = std::fs::OpenOptions::new().write(true).create(true).open(&lock_path).unwrap();
        assert!(second.try_lock_exclusive().is_err());
    }

    #[tokio::test]
    async fn idle_eviction_resolves_once_the_timeout_elapses_with_no_active_requests() {
        let fired = wait_for_idle_eviction(|| 0, std::time::Duration::from_secs(2));
        tokio::time::timeout(std::time::Duration::from_secs(5), fired).await.unwrap();
    }
}
