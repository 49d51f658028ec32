// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port leasing (spec §4.8): reader/writer/deploy modes over named serial
//! ports, in-memory only — the same "no file locks for intra-process
//! resource ownership" split `anvil_daemon::locks` uses for `env:<name>`,
//! applied here to the `device:<port>` resource name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anvil_core::{DeviceSessionId, LeaseMode};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortLeaseError {
    #[error("port '{port}' writer slot is held by another session")]
    WouldBlock { port: String },
}

struct PortState {
    readers: HashSet<DeviceSessionId>,
    writer: Option<DeviceSessionId>,
    deploy: Option<DeviceSessionId>,
    preempted: bool,
    reconnect: Arc<Notify>,
}

impl PortState {
    fn new() -> Self {
        Self { readers: HashSet::new(), writer: None, deploy: None, preempted: false, reconnect: Arc::new(Notify::new()) }
    }
}

/// A snapshot of who held a port's reader/writer leases at the moment a
/// deploy preempted it, used to address the preemption notice and to log
/// what was displaced.
#[derive(Debug, Clone, Default)]
pub struct PreemptedLeases {
    pub readers: Vec<DeviceSessionId>,
    pub writer: Option<DeviceSessionId>,
}

/// The coordinator's port-lease table: reader/writer/deploy per named
/// port (spec §4.8 `lease(port, client_id, mode) -> lease_id`).
pub struct PortLeaseManager {
    ports: Mutex<HashMap<String, PortState>>,
}

impl PortLeaseManager {
    pub fn new() -> Self {
        Self { ports: Mutex::new(HashMap::new()) }
    }

    /// Acquire `mode` on `port` for `session`. Reader and deploy always
    /// succeed (readers are non-exclusive; deploy preempts — see
    /// [`PortLeaseManager::begin_deploy`] for the preemption path writers
    /// and monitors should actually go through). Writer is rejected with
    /// [`PortLeaseError::WouldBlock`] if another session already holds the
    /// writer or deploy slot.
    pub fn acquire(&self, port: &str, session: DeviceSessionId, mode: LeaseMode) -> Result<(), PortLeaseError> {
        match mode {
            LeaseMode::Reader => {
                self.acquire_reader(port, session);
                Ok(())
            }
            LeaseMode::Writer => self.acquire_writer(port, session),
            LeaseMode::Deploy => {
                self.begin_deploy(port, session);
                Ok(())
            }
        }
    }

    pub fn release(&self, port: &str, session: DeviceSessionId, mode: LeaseMode) {
        match mode {
            LeaseMode::Reader => self.release_reader(port, session),
            LeaseMode::Writer => self.release_writer(port, session),
            LeaseMode::Deploy => self.end_deploy(port, session),
        }
    }

    fn acquire_reader(&self, port: &str, session: DeviceSessionId) {
        self.ports.lock().entry(port.to_string()).or_insert_with(PortState::new).readers.insert(session);
    }

    fn release_reader(&self, port: &str, session: DeviceSessionId) {
        if let Some(state) = self.ports.lock().get_mut(port) {
            state.readers.remove(&session);
        }
    }

    fn acquire_writer(&self, port: &str, session: DeviceSessionId) -> Result<(), PortLeaseError> {
        let mut ports = self.ports.lock();
        let state = ports.entry(port.to_string()).or_insert_with(PortState::new);
        if state.deploy.is_some_and(|h| h != session) || state.writer.is_some_and(|h| h != session) {
            return Err(PortLeaseError::WouldBlock { port: port.to_string() });
        }
        state.writer = Some(session);
        Ok(())
    }

    fn release_writer(&self, port: &str, session: DeviceSessionId) {
        if let Some(state) = self.ports.lock().get_mut(port) {
            if state.writer == Some(session) {
                state.writer = None;
            }
        }
    }

    /// Exclusive, preempts every existing reader and writer lease (spec
    /// §4.8 "deploy preemption"). Always succeeds — deploy never waits.
    /// Returns the leases it displaced so the caller can deliver the
    /// preemption notice and log what was interrupted.
    pub fn begin_deploy(&self, port: &str, session: DeviceSessionId) -> PreemptedLeases {
        let mut ports = self.ports.lock();
        let state = ports.entry(port.to_string()).or_insert_with(PortState::new);
        let preempted =
            PreemptedLeases { readers: state.readers.iter().copied().collect(), writer: state.writer };
        state.deploy = Some(session);
        state.preempted = true;
        preempted
    }

    /// Clears the deploy lease and the preemption notice, waking any
    /// reader awaiting [`PortLeaseManager::wait_for_reconnect`].
    fn end_deploy(&self, port: &str, session: DeviceSessionId) {
        let mut ports = self.ports.lock();
        if let Some(state) = ports.get_mut(port) {
            if state.deploy == Some(session) {
                state.deploy = None;
            }
            state.preempted = false;
            state.reconnect.notify_waiters();
        }
    }

    pub fn is_preempted(&self, port: &str) -> bool {
        self.ports.lock().get(port).map(|s| s.preempted).unwrap_or(false)
    }

    /// Readers call this after acknowledging a preemption notice; it
    /// resolves once [`PortLeaseManager::end_deploy`] clears the notice.
    pub async fn wait_for_reconnect(&self, port: &str) {
        let notify = {
            let mut ports = self.ports.lock();
            Arc::clone(&ports.entry(port.to_string()).or_insert_with(PortState::new).reconnect)
        };
        notify.notified().await;
    }

    pub fn active_readers(&self, port: &str) -> Vec<DeviceSessionId> {
        self.ports.lock().get(port).map(|s| s.readers.iter().copied().collect()).unwrap_or_default()
    }
}

impl Default for PortLeaseManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_coexist_without_limit() {
        let mgr = PortLeaseManager::new();
        let a = DeviceSessionId::new();
        let b = DeviceSessionId::new();
        mgr.acquire("/dev/ttyUSB0", a, LeaseMode::Reader).unwrap();
        mgr.acquire("/dev/ttyUSB0", b, LeaseMode::Reader).unwrap();
        assert_eq!(mgr.active_readers("/dev/ttyUSB0").len(), 2);
    }

    #[test]
    fn second_writer_is_rejected() {
        let mgr = PortLeaseManager::new();
        let a = DeviceSessionId::new();
        let b = DeviceSessionId::new();
        mgr.acquire("/dev/ttyUSB0", a, LeaseMode::Writer).unwrap();
        let err = mgr.acquire("/dev/ttyUSB0", b, LeaseMode::Writer).unwrap_err();
        assert!(matches!(err, PortLeaseError::WouldBlock { .. }));
    }

    #[test]
    fn same_session_reacquiring_writer_is_idempotent() {
        let mgr = PortLeaseManager::new();
        let a = DeviceSessionId::new();
        mgr.acquire("/dev/ttyUSB0", a, LeaseMode::Writer).unwrap();
        assert!(mgr.acquire("/dev/ttyUSB0", a, LeaseMode::Writer).is_ok());
    }

    #[test]
    fn deploy_always_succeeds_and_reports_what_it_preempted() {
        let mgr = PortLeaseManager::new();
        let reader = DeviceSessionId::new();
        let writer = DeviceSessionId::new();
        let deployer = DeviceSessionId::new();
        mgr.acquire("/dev/ttyUSB0", reader, LeaseMode::Reader).unwrap();
        mgr.acquire("/dev/ttyUSB0", writer, LeaseMode::Writer).unwrap();

        let preempted = mgr.begin_deploy("/dev/ttyUSB0", deployer);

        assert_eq!(preempted.readers, vec![reader]);
        assert_eq!(preempted.writer, Some(writer));
        assert!(mgr.is_preempted("/dev/ttyUSB0"));
    }

    #[tokio::test]
    async fn end_deploy_wakes_waiting_readers() {
        let mgr = Arc::new(PortLeaseManager::new());
        let deployer = DeviceSessionId::new();
        mgr.begin_deploy("/dev/ttyUSB0", deployer);

        let waiter = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.wait_for_reconnect("/dev/ttyUSB0").await })
        };
        tokio::task::yield_now().await;
        mgr.release("/dev/ttyUSB0", deployer, LeaseMode::Deploy);

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(!mgr.is_preempted("/dev/ttyUSB0"));
    }
}
