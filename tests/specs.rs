// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box specs: each test spawns the real `anvil`/`anvild` binaries
//! against a throwaway project and state directory (see `support::Project`)
//! and asserts on their externally observable behavior — exit codes,
//! stdout/stderr, and the daemon's own HTTP query routes — never on
//! internal state.

#[path = "support/mod.rs"]
mod support;

#[path = "specs/daemon/lifecycle.rs"]
mod daemon_lifecycle;
#[path = "specs/daemon/install_deps.rs"]
mod daemon_install_deps;
#[path = "specs/daemon/locks_and_devices.rs"]
mod daemon_locks_and_devices;
