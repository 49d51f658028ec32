// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::bootstrap::BootstrapError;

/// Protocol version exchanged by the bootstrap health probe, distinct from
/// `anvil_wire::PROTOCOL_VERSION` (the wire format version) — this one
/// also carries the crate's semver so `/api/daemon/version` can report
/// both without a client parsing two routes.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"));

/// Whether this invocation is running in development mode (spec §4.1,
/// §6): dev and prod never share a port or a state directory, so a
/// developer iterating on `anvild` locally can't collide with (or get
/// silently adopted by) a production instance on the same host.
pub fn dev_mode() -> bool {
    std::env::var("ANVIL_DEV").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Resolve the state directory: `ANVIL_STATE_DIR` > `XDG_STATE_HOME/anvil[-dev]`
/// > `~/.local/state/anvil[-dev]`.
pub fn state_dir() -> Result<PathBuf, BootstrapError> {
    let leaf = if dev_mode() { "anvil-dev" } else { "anvil" };
    if let Ok(dir) = std::env::var("ANVIL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join(leaf));
    }
    dirs::home_dir().map(|home| home.join(".local/state").join(leaf)).ok_or(BootstrapError::NoStateDir)
}

/// Resolve the package cache directory: `ANVIL_CACHE_DIR` > `XDG_CACHE_HOME/anvil`
/// > `~/.cache/anvil`.
pub fn cache_dir() -> Result<PathBuf, BootstrapError> {
    if let Ok(dir) = std::env::var("ANVIL_CACHE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        return Ok(PathBuf::from(xdg).join("anvil"));
    }
    dirs::cache_dir().map(|cache| cache.join("anvil")).ok_or(BootstrapError::NoStateDir)
}

/// TCP port the daemon listens on: production and development modes
/// default to distinct ports (spec §4.1) so the two never collide;
/// `ANVIL_PORT` always wins when set, including `ANVIL_PORT=0` for test
/// fixtures that want an OS-assigned ephemeral port read back out of the
/// published port file.
pub fn requested_port() -> u16 {
    std::env::var("ANVIL_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(if dev_mode() { 8865 } else { 8765 })
}

/// Idle eviction timeout: the daemon exits once this long has passed with
/// zero active requests. Defaults to 30 minutes.
pub fn idle_timeout() -> Duration {
    std::env::var("ANVIL_IDLE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30 * 60))
}

/// Cancellation liveness TTL cache (spec §4.4): how long a `pid is alive`
/// check result may be reused before it is re-checked.
pub fn cancellation_cache_ttl() -> Duration {
    std::env::var("ANVIL_CANCEL_CACHE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(100))
}

/// Cancellation checkpoint interval used by the compilation pool and the
/// package pipeline's blocking wait (spec §4.7).
pub fn cancellation_checkpoint() -> Duration {
    std::env::var("ANVIL_CANCEL_CHECKPOINT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(500))
}

/// Interval between stale-lock sweeps (spec §4.3 `clear_stale`, "invoked on
/// dispatcher idle ticks"). A periodic safety net, not the primary release
/// path — `LockBundle::drop` handles the common case.
pub fn stale_lock_sweep_interval() -> Duration {
    std::env::var("ANVIL_STALE_LOCK_SWEEP_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(2))
}

/// Total wall-clock budget for one upload attempt (spec §4.8 watchdog).
/// Defaults to 2 minutes — generous enough for a slow ESP32 flash, short
/// enough that a genuinely wedged uploader doesn't block the device lock
/// indefinitely.
pub fn upload_total_timeout() -> Duration {
    std::env::var("ANVIL_UPLOAD_TOTAL_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(120))
}

/// Inactivity budget for one upload attempt: no output for this long kills
/// the uploader even if the total budget hasn't elapsed (spec §4.8).
pub fn upload_inactivity_timeout() -> Duration {
    std::env::var("ANVIL_UPLOAD_INACTIVITY_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(15))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial(anvil_dev_env)]
    fn requested_port_falls_back_to_the_documented_default() {
        std::env::remove_var("ANVIL_PORT");
        std::env::remove_var("ANVIL_DEV");
        assert_eq!(requested_port(), 8765);
    }

    #[test]
    #[serial_test::serial(anvil_dev_env)]
    fn dev_mode_uses_the_distinct_dev_port_and_state_leaf() {
        std::env::remove_var("ANVIL_PORT");
        std::env::remove_var("ANVIL_STATE_DIR");
        std::env::set_var("ANVIL_DEV", "1");
        assert_eq!(requested_port(), 8865);
        assert!(state_dir().unwrap().ends_with("anvil-dev"));
        std::env::remove_var("ANVIL_DEV");
    }

    #[test]
    fn idle_timeout_reads_milliseconds_override() {
        std::env::set_var("ANVIL_IDLE_TIMEOUT_MS", "1500");
        assert_eq!(idle_timeout(), Duration::from_millis(1500));
        std::env::remove_var("ANVIL_IDLE_TIMEOUT_MS");
    }

    #[test]
    fn cancellation_cache_ttl_defaults_to_one_hundred_ms() {
        std::env::remove_var("ANVIL_CANCEL_CACHE_MS");
        assert_eq!(cancellation_cache_ttl(), Duration::from_millis(100));
    }
}
