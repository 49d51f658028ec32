// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation registry (spec §4.4): a request is cancelled either by an
//! explicit signal from its owning client, or by that client's process
//! having died. Liveness is checked through a short-TTL cache so a busy
//! compile loop doesn't stat `/proc` on every checkpoint; an explicit
//! signal always takes effect immediately and is never cached away.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anvil_core::{CancellationToken, RequestId};
use parking_lot::Mutex;

/// Abstracts "is this pid still alive" so tests don't depend on spawning
/// and killing real processes.
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Reads `/proc/<pid>` on Linux. Every other platform reports pids as
/// always alive — liveness-based cancellation degrades to explicit-signal
/// only there, which is still strictly more conservative than cancelling
/// early.
pub struct ProcfsLivenessProbe;

impl LivenessProbe for ProcfsLivenessProbe {
    #[cfg(target_os = "linux")]
    fn is_alive(&self, pid: u32) -> bool {
        std::path::Path::new(&format!("/proc/{pid}")).exists()
    }

    #[cfg(not(target_os = "linux"))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

struct Entry {
    token: CancellationToken,
    caller_pid: u32,
    cached_alive_at: Option<Instant>,
}

/// The dual-channel registry itself: one [`CancellationToken`] per
/// in-flight request, shared with every worker (compile pool, package
/// pipeline, build orchestrator) driving that request.
pub struct CancellationRegistry<P: LivenessProbe> {
    probe: P,
    ttl: Duration,
    entries: Mutex<HashMap<RequestId, Entry>>,
}

impl<P: LivenessProbe> CancellationRegistry<P> {
    pub fn new(probe: P, ttl: Duration) -> Self {
        Self { probe, ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Start tracking a new request, returning the token its workers
    /// should carry into every cancellation checkpoint.
    pub fn register(&self, request_id: RequestId, caller_pid: u32) -> CancellationToken {
        let token = CancellationToken::new();
        self.entries.lock().insert(
            request_id,
            Entry { token: token.clone(), caller_pid, cached_alive_at: None },
        );
        token
    }

    /// Explicit cancel signal from the owning client. Takes effect
    /// immediately regardless of the liveness cache state.
    pub fn signal(&self, request_id: RequestId) {
        if let Some(entry) = self.entries.lock().get(&request_id) {
            entry.token.cancel();
        }
    }

    /// The checkpoint callers actually poll: true once either an explicit
    /// signal landed or the owning pid was last observed dead within the
    /// TTL window.
    pub fn is_cancelled(&self, request_id: RequestId) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&request_id) else { return false };
        if entry.token.is_cancelled() {
            return true;
        }
        let fresh = entry.cached_alive_at.is_some_and(|at| at.elapsed() < self.ttl);
        if fresh {
            return false;
        }
        entry.cached_alive_at = Some(Instant::now());
        if !self.probe.is_alive(entry.caller_pid) {
            entry.token.cancel();
            return true;
        }
        false
    }

    /// Stop tracking a request once its terminal status has published.
    pub fn unregister(&self, request_id: RequestId) {
        self.entries.lock().remove(&request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProbe {
        dead: Mutex<std::collections::HashSet<u32>>,
    }

    impl FakeProbe {
        fn new() -> Self {
            Self { dead: Mutex::new(std::collections::HashSet::new()) }
        }

        fn kill(&self, pid: u32) {
            self.dead.lock().insert(pid);
        }
    }

    impl LivenessProbe for FakeProbe {
        fn is_alive(&self, pid: u32) -> bool {
            !self.dead.lock().contains(&pid)
        }
    }

    #[test]
    fn explicit_signal_is_observed_immediately() {
        let registry = CancellationRegistry::new(FakeProbe::new(), Duration::from_secs(60));
        let request_id = RequestId::new();
        registry.register(request_id, 42);
        assert!(!registry.is_cancelled(request_id));
        registry.signal(request_id);
        assert!(registry.is_cancelled(request_id));
    }

    #[test]
    fn dead_owner_is_observed_as_cancelled_once_the_ttl_elapses() {
        struct ControllableProbe {
            alive: Mutex<bool>,
        }
        impl LivenessProbe for ControllableProbe {
            fn is_alive(&self, _pid: u32) -> bool {
                *self.alive.lock()
            }
        }
        let probe = ControllableProbe { alive: Mutex::new(true) };
        let registry = CancellationRegistry::new(probe, Duration::from_millis(10));
        let request_id = RequestId::new();
        registry.register(request_id, 4242);
        assert!(!registry.is_cancelled(request_id));

        // The owning client's process exits without signalling cancel.
        *registry.probe.alive.lock() = false;
        std::thread::sleep(Duration::from_millis(20));
        assert!(registry.is_cancelled(request_id));
    }

    #[test]
    fn liveness_cache_is_not_rechecked_within_ttl() {
        struct ControllableProbe {
            alive: Mutex<bool>,
        }
        impl LivenessProbe for ControllableProbe {
            fn is_alive(&self, _pid: u32) -> bool {
                *self.alive.lock()
            }
        }
        let probe = ControllableProbe { alive: Mutex::new(true) };
        let registry = CancellationRegistry::new(probe, Duration::from_secs(60));
        let request_id = RequestId::new();
        registry.register(request_id, 42);
        assert!(!registry.is_cancelled(request_id));

        // The pid "dies" right after the first check, but the cached
        // liveness result should still read fresh for the TTL window.
        *registry.probe.alive.lock() = false;
        assert!(!registry.is_cancelled(request_id));
    }

    #[test]
    fn unregister_forgets_the_request() {
        let registry = CancellationRegistry::new(FakeProbe::new(), Duration::from_secs(60));
        let request_id = RequestId::new();
        registry.register(request_id, 42);
        registry.unregister(request_id);
        assert!(!registry.is_cancelled(request_id));
    }

    #[test]
    fn liveness_is_rechecked_once_the_ttl_elapses() {
        struct ControllableProbe {
            alive: Mutex<bool>,
        }
        impl LivenessProbe for ControllableProbe {
            fn is_alive(&self, _pid: u32) -> bool {
                *self.alive.lock()
            }
        }
        let probe = ControllableProbe { alive: Mutex::new(true) };
        let registry = CancellationRegistry::new(probe, Duration::from_millis(10));
        let request_id = RequestId::new();
        registry.register(request_id, 7);
        assert!(!registry.is_cancelled(request_id));
        *registry.probe.alive.lock() = false;
        std::thread::sleep(Duration::from_millis(20));
        assert!(registry.is_cancelled(request_id));
    }
}
