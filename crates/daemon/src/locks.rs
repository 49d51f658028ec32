// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory named resource lock manager (spec §4.3).
//!
//! File-based locking is reserved for the single-instance daemon bootstrap
//! lock (see [`crate::bootstrap`]) — every other resource, named
//! `env:<name>`, `device:<port>`, or `install:<name>@<version>`, is
//! coordinated through this process-local map instead, the same split the
//! teacher draws between its daemon lock file and its in-memory
//! `Arc<Mutex<MaterializedState>>`.

use std::collections::HashMap;

use anvil_core::{Clock, LeaseId, LockError, LockPolicy, LockStatus};
use parking_lot::Mutex;

struct Entry {
    owner_pid: u32,
    lease_id: LeaseId,
    acquired_at_ms: u64,
}

pub struct LockManager<C: Clock> {
    clock: C,
    entries: Mutex<HashMap<String, Entry>>,
}

impl<C: Clock> LockManager<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, entries: Mutex::new(HashMap::new()) }
    }

    /// Acquire `name` for `owner_pid`. Reacquiring a lock you already hold
    /// is idempotent and returns the existing lease. Under
    /// [`LockPolicy::Wait`] a lock held by a different pid fails fast with
    /// [`LockError::WouldBlock`] — callers surface this as the
    /// `lock_contended` error kind rather than actually waiting, since the
    /// dispatcher has no notion of queuing a request behind another. Under
    /// [`LockPolicy::Preempt`] the lock is always reassigned.
    pub fn acquire(&self, name: &str, owner_pid: u32, policy: LockPolicy) -> Result<LeaseId, LockError> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(name) {
            if existing.owner_pid == owner_pid {
                return Ok(existing.lease_id);
            }
            match policy {
                LockPolicy::Wait => {
                    return Err(LockError::WouldBlock { name: name.to_string(), holder_pid: existing.owner_pid })
                }
                LockPolicy::Preempt => {}
            }
        }
        let lease_id = LeaseId::new();
        entries.insert(
            name.to_string(),
            Entry { owner_pid, lease_id, acquired_at_ms: self.clock.epoch_ms() },
        );
        Ok(lease_id)
    }

    /// Release `name` iff it is currently held under `lease_id` — a stale
    /// release (e.g. from a request that was preempted out) is a silent
    /// no-op rather than an error.
    pub fn release(&self, name: &str, lease_id: LeaseId) {
        let mut entries = self.entries.lock();
        if entries.get(name).is_some_and(|e| e.lease_id == lease_id) {
            entries.remove(name);
        }
    }

    pub fn status(&self) -> Vec<LockStatus> {
        let now = self.clock.epoch_ms();
        self.entries
            .lock()
            .iter()
            .map(|(name, entry)| LockStatus {
                name: name.clone(),
                owner_pid: entry.owner_pid,
                lease_id: entry.lease_id,
                age_ms: now.saturating_sub(entry.acquired_at_ms),
            })
            .collect()
    }

    /// Drop every lock whose owning pid `is_alive` reports dead. Used by
    /// the dispatcher's periodic sweep (spec §8 "dead client cleanup").
    pub fn clear_stale(&self, is_alive: impl Fn(u32) -> bool) -> Vec<String> {
        let mut entries = self.entries.lock();
        let dead: Vec<String> =
            entries.iter().filter(|(_, e)| !is_alive(e.owner_pid)).map(|(name, _)| name.clone()).collect();
        for name in &dead {
            entries.remove(name);
        }
        dead
    }
}

/// A set of locks acquired together for one request, released on every
/// exit path (success, failure, or cancellation) via `Drop` rather than
/// relying on every call site to remember to release explicitly.
pub struct LockBundle<'a, C: Clock> {
    manager: &'a LockManager<C>,
    held: Vec<(String, LeaseId)>,
}

impl<'a, C: Clock> LockBundle<'a, C> {
    pub fn new(manager: &'a LockManager<C>) -> Self {
        Self { manager, held: Vec::new() }
    }

    /// Acquire one more lock into this bundle. On failure, everything
    /// already held by this bundle is released before the error is
    /// returned, so a partially-satisfied request never leaks locks.
    pub fn acquire(&mut self, name: &str, owner_pid: u32, policy: LockPolicy) -> Result<(), LockError> {
        match self.manager.acquire(name, owner_pid, policy) {
            Ok(lease_id) => {
                self.held.push((name.to_string(), lease_id));
                Ok(())
            }
            Err(err) => {
                self.release_all();
                Err(err)
            }
        }
    }

    fn release_all(&mut self) {
        for (name, lease_id) in self.held.drain(..) {
            self.manager.release(&name, lease_id);
        }
    }
}

impl<C: Clock> Drop for LockBundle<'_, C> {
    fn drop(&mut self) {
        self.release_all();
    }
}
