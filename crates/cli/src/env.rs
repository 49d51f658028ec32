// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI crate.
//!
//! Mirrors `anvil_daemon::env` exactly (same variable names, same
//! dev/prod port and state-dir split) since the client and the daemon it
//! locates must agree on where to look without either depending on the
//! other's binary-only crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("could not determine a state directory (no ANVIL_STATE_DIR, XDG_STATE_HOME, or $HOME)")]
    NoStateDir,
}

pub fn dev_mode() -> bool {
    std::env::var("ANVIL_DEV").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn state_dir() -> Result<PathBuf, EnvError> {
    let leaf = if dev_mode() { "anvil-dev" } else { "anvil" };
    if let Ok(dir) = std::env::var("ANVIL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join(leaf));
    }
    dirs::home_dir().map(|home| home.join(".local/state").join(leaf)).ok_or(EnvError::NoStateDir)
}

pub fn port_path() -> Result<PathBuf, EnvError> {
    Ok(state_dir()?.join("daemon.port"))
}

pub fn singleton_lock_path() -> Result<PathBuf, EnvError> {
    Ok(state_dir()?.join("daemon.lock"))
}

pub fn spawn_log_path() -> Result<PathBuf, EnvError> {
    Ok(state_dir()?.join("spawn.log"))
}

pub fn requested_port_override() -> Option<u16> {
    std::env::var("ANVIL_PORT").ok().and_then(|s| s.parse::<u16>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial(anvil_dev_env)]
    fn dev_mode_changes_the_state_dir_leaf() {
        std::env::remove_var("ANVIL_STATE_DIR");
        std::env::remove_var("ANVIL_DEV");
        assert!(state_dir().unwrap().ends_with("anvil"));
        std::env::set_var("ANVIL_DEV", "1");
        assert!(state_dir().unwrap().ends_with("anvil-dev"));
        std::env::remove_var("ANVIL_DEV");
    }
}
