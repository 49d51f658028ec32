// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared black-box test harness: a throwaway project directory with its
//! own state dir and an ephemeral daemon port, so every spec runs against
//! an `anvild` instance no other test can see. Grounded on the reference
//! pack's `Project`/`oj()` shape — a thin wrapper that hands back a
//! pre-configured [`assert_cmd::Command`] rather than re-deriving the
//! env/cwd wiring at every call site.

use std::path::PathBuf;
use std::time::Duration;

use assert_cmd::Command;

/// A project fixture: an isolated temp directory holding `anvil.toml`, and
/// an isolated state directory no other test's daemon can collide with.
pub struct Project {
    root: tempfile::TempDir,
    state_dir: PathBuf,
}

/// Keeps the DAG to three tasks (platform, toolchain, framework) with no
/// library layer, so a test only has to wait out one retry chain.
pub const MANIFEST: &str = r#"
[environments.uno]
platform = "atmelavr"
board = "uno"
framework = "arduino"
"#;

impl Project {
    /// A project with the default single-environment manifest above.
    pub fn new() -> Self {
        Self::with_manifest(MANIFEST)
    }

    pub fn with_manifest(manifest: &str) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::write(root.path().join("anvil.toml"), manifest).expect("write manifest");
        let state_dir = root.path().join("state");
        std::fs::create_dir_all(&state_dir).expect("state dir");
        Self { root, state_dir }
    }

    pub fn path(&self) -> &std::path::Path {
        self.root.path()
    }

    /// A pre-wired `anvil` invocation: isolated state dir, an
    /// OS-assigned ephemeral port (spec'd by `ANVIL_PORT=0`), a short idle
    /// timeout so a daemon this test forgets to shut down exits on its
    /// own, and a generous (but bounded) timeout so a hung request fails
    /// the test instead of hanging the suite.
    pub fn anvil<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let mut cmd = Command::cargo_bin("anvil").expect("anvil binary");
        cmd.current_dir(self.root.path())
            .env("ANVIL_STATE_DIR", &self.state_dir)
            .env("ANVIL_PORT", "0")
            .env("ANVIL_IDLE_TIMEOUT_MS", "5000")
            .env_remove("ANVIL_DEV")
            .args(args)
            .timeout(Duration::from_secs(30));
        cmd
    }

    /// Same wiring as [`Project::anvil`], but with the cancellation
    /// liveness cache shortened so a dead-client test doesn't have to
    /// wait out the 100ms production default several times over.
    pub fn anvil_fast_cancel<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let mut cmd = self.anvil(args);
        cmd.env("ANVIL_CANCEL_CACHE_MS", "20");
        cmd
    }

    /// Best-effort cleanup: ask the daemon (if one is running under this
    /// project's state dir) to shut down. Never panics — a test that
    /// already shut the daemon down itself just gets a no-op here.
    pub fn shutdown(&self) {
        let _ = self.anvil(["shutdown"]).timeout(Duration::from_secs(5)).ok();
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Polls `check` every `interval` until it returns `Some`, or panics once
/// `timeout` has elapsed. Used to wait for a streamed condition (a
/// particular stage showing up in a status stream, a lock appearing)
/// without guessing a fixed sleep.
pub fn wait_for<T>(timeout: Duration, interval: Duration, mut check: impl FnMut() -> Option<T>) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(value) = check() {
            return value;
        }
        if start.elapsed() > timeout {
            panic!("condition did not become true within {timeout:?}");
        }
        std::thread::sleep(interval);
    }
}
