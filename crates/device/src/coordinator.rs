// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ties port leasing, the line-oriented ring buffer, and the deploy
//! preemption sequence (spec §4.8) into the one object the daemon's
//! dispatcher drives. The coordinator owns the single physical handle per
//! port; monitor readers never open a port themselves, they read from the
//! buffer this type maintains and poll [`DeviceCoordinator::is_preempted`]
//! at the cadence the daemon's WebSocket loop already needs for its own
//! receive checkpoint.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anvil_core::{DeviceSessionId, LeaseMode, SerialLine};
use parking_lot::Mutex;

use crate::lease::{PortLeaseError, PortLeaseManager, PreemptedLeases};
use crate::port::{PortError, SerialPort, SerialPortFactory};
use crate::ring::LineBuffer;

struct PortRuntime {
    handle: Option<Box<dyn SerialPort>>,
    buffer: LineBuffer,
}

impl PortRuntime {
    fn new() -> Self {
        Self { handle: None, buffer: LineBuffer::default() }
    }
}

pub struct DeviceCoordinator {
    factory: Arc<dyn SerialPortFactory>,
    leases: PortLeaseManager,
    runtimes: Mutex<HashMap<String, PortRuntime>>,
}

impl DeviceCoordinator {
    pub fn new(factory: Arc<dyn SerialPortFactory>) -> Self {
        Self { factory, leases: PortLeaseManager::new(), runtimes: Mutex::new(HashMap::new()) }
    }

    /// Open the port's shared handle if it isn't already open. A no-op if
    /// a handle is already live (readers share the one open handle).
    pub fn ensure_open(&self, port: &str) -> Result<(), PortError> {
        let mut runtimes = self.runtimes.lock();
        let runtime = runtimes.entry(port.to_string()).or_insert_with(PortRuntime::new);
        if runtime.handle.is_none() {
            runtime.handle = Some(self.factory.open(port)?);
        }
        Ok(())
    }

    /// Pump at most one line from the shared handle into the ring buffer.
    /// Returns `Ok(false)` on a clean EOF (the handle is dropped in that
    /// case — callers should `ensure_open` again to reconnect).
    pub async fn pump_once(&self, port: &str) -> Result<bool, PortError> {
        let handle = {
            let mut runtimes = self.runtimes.lock();
            let runtime = runtimes.entry(port.to_string()).or_insert_with(PortRuntime::new);
            runtime.handle.take()
        };
        let Some(mut handle) = handle else { return Ok(false) };

        let line = handle.read_line().await?;
        let mut runtimes = self.runtimes.lock();
        let runtime = runtimes.entry(port.to_string()).or_insert_with(PortRuntime::new);
        match line {
            Some(text) => {
                runtime.buffer.push(text);
                runtime.handle = Some(handle);
                Ok(true)
            }
            None => {
                runtime.handle = None;
                Ok(false)
            }
        }
    }

    /// Attach a monitor reader, returning its initial cursor (everything
    /// from here forward is "new").
    pub fn attach_reader(&self, port: &str, session: DeviceSessionId) -> Result<u64, PortLeaseError> {
        self.leases.acquire(port, session, LeaseMode::Reader)?;
        Ok(self.runtimes.lock().entry(port.to_string()).or_insert_with(PortRuntime::new).buffer.latest_index())
    }

    pub fn detach_reader(&self, port: &str, session: DeviceSessionId) {
        self.leases.release(port, session, LeaseMode::Reader);
    }

    pub fn acquire_writer(&self, port: &str, session: DeviceSessionId) -> Result<(), PortLeaseError> {
        self.leases.acquire(port, session, LeaseMode::Writer)
    }

    pub fn release_writer(&self, port: &str, session: DeviceSessionId) {
        self.leases.release(port, session, LeaseMode::Writer);
    }

    pub fn lines_since(&self, port: &str, cursor: u64) -> Vec<SerialLine> {
        self.runtimes.lock().entry(port.to_string()).or_insert_with(PortRuntime::new).buffer.since(cursor)
    }

    pub fn is_preempted(&self, port: &str) -> bool {
        self.leases.is_preempted(port)
    }

    pub async fn wait_for_reconnect(&self, port: &str) {
        self.leases.wait_for_reconnect(port).await;
    }

    /// Run the full deploy preemption sequence (spec §4.8):
    /// 1. Mark the port preempted (readers observe this at their next
    ///    poll via [`DeviceCoordinator::is_preempted`] and pause).
    /// 2. Close the shared handle.
    /// 3. Run `upload` (the caller's watchdog-timed upload invocation).
    /// 4. Reopen the handle.
    /// 5. Clear the preemption notice, waking paused readers.
    pub async fn deploy<U, Fut, T>(
        &self,
        port: &str,
        session: DeviceSessionId,
        upload: U,
    ) -> Result<(PreemptedLeases, T), PortError>
    where
        U: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let preempted = self.leases.begin_deploy(port, session);
        self.close(port);

        let result = upload().await;

        self.ensure_open(port)?;
        self.leases.release(port, session, LeaseMode::Deploy);
        Ok((preempted, result))
    }

    fn close(&self, port: &str) {
        if let Some(runtime) = self.runtimes.lock().get_mut(port) {
            runtime.handle = None;
        }
    }
}
