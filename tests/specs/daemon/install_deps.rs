// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Package-install request lifecycle against the real daemon (spec §4.6,
//! §8 "dead client cleanup"). The fixture registry is unreachable by
//! design (see `support::MANIFEST`), so these specs exercise the
//! lock/lifecycle surface rather than a successful install — the
//! pipeline's own fake-downloader coverage in `anvil-engine` is where a
//! full fresh-install/no-change-rebuild run is exercised end to end.

use std::time::Duration;

use crate::support;
use crate::support::Project;

/// Scenario 6 (spec §8): a dead owning client's lock must not survive the
/// next stale-lock sweep, even though nothing explicitly signalled cancel.
#[test]
fn killing_the_owning_client_eventually_releases_its_lock() {
    let project = Project::new();

    let mut child = project
        .anvil(["install-deps", "uno"])
        .spawn()
        .expect("spawn anvil install-deps");

    support::wait_for(Duration::from_secs(15), Duration::from_millis(50), || {
        let output = project.anvil(["locks"]).ok().ok()?;
        String::from_utf8(output.stdout).unwrap_or_default().contains("env:uno").then_some(())
    });

    child.kill().expect("kill client process");
    let _ = child.wait();

    // The stale-lock sweep runs on a fixed interval (spec §4.3
    // `clear_stale`); give it a couple of ticks to observe the dead pid
    // and drop the lock rather than asserting on the very next poll.
    support::wait_for(Duration::from_secs(10), Duration::from_millis(200), || {
        let output = project.anvil(["locks"]).ok().ok()?;
        let stdout = String::from_utf8(output.stdout).unwrap_or_default();
        (!stdout.contains("env:uno")).then_some(())
    });
}

/// A request for an environment with no declared libraries still produces
/// a task graph (platform, toolchain, framework) and the lock it holds is
/// visible under its own name — no fourth phantom task, no stray lock for
/// an environment nobody asked for.
#[test]
fn install_deps_holds_only_the_lock_for_its_own_environment() {
    let project = Project::with_manifest(
        r#"
[environments.uno]
platform = "atmelavr"
board = "uno"
framework = "arduino"

[environments.esp32c6]
platform = "espressif32"
board = "esp32-c6-devkitm-1"
framework = "arduino"
"#,
    );

    let mut child = project
        .anvil(["install-deps", "esp32c6"])
        .spawn()
        .expect("spawn anvil install-deps");

    let stdout = support::wait_for(Duration::from_secs(15), Duration::from_millis(50), || {
        let output = project.anvil(["locks"]).ok().ok()?;
        let stdout = String::from_utf8(output.stdout).unwrap_or_default();
        stdout.contains("env:esp32c6").then_some(stdout)
    });

    assert!(!stdout.contains("env:uno"), "expected no lock for the environment never requested, got: {stdout}");

    let _ = child.kill();
    let _ = child.wait();
}
