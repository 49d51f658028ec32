// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock contention and the device/lock query surface (spec §4.3, §8).

use std::time::Duration;

use predicates::prelude::*;

use crate::support;
use crate::support::Project;

#[test]
fn locks_and_devices_report_empty_once_a_daemon_is_up() {
    let project = Project::new();

    let mut child = project
        .anvil(["install-deps", "uno"])
        .spawn()
        .expect("spawn anvil install-deps");

    support::wait_for(Duration::from_secs(15), Duration::from_millis(100), || {
        let output = project.anvil(["status"]).ok().ok()?;
        String::from_utf8(output.stdout).unwrap_or_default().contains("status: running").then_some(())
    });

    // The fixture host has no real serial ports wired up, so both
    // queries should report their "nothing here" lines rather than
    // listing stale or fabricated entries.
    project.anvil(["devices"]).assert().success().stdout(predicate::str::contains("no serial devices detected"));

    let _ = child.kill();
    let _ = child.wait();
}

/// A second `install-deps` against the same environment, issued while the
/// first is still mid-download, must fail immediately with a lock
/// contention error rather than queueing behind it — `LockPolicy::Wait`
/// fails fast, it does not actually wait (spec §4.3). This also exercises
/// singleton bootstrap tolerance: if two independent daemons had somehow
/// come up, each would have its own lock table and neither request would
/// observe the other's lock.
#[test]
fn a_second_install_deps_for_the_same_environment_fails_fast_on_lock_contention() {
    let project = Project::new();

    // The first request owns the download/backoff loop against an
    // unreachable registry (~7s of real retries) for the duration of
    // this test; it only needs to live long enough to hold the lock
    // while the second request observes the contention.
    let mut first = project
        .anvil(["install-deps", "uno"])
        .spawn()
        .expect("spawn first anvil install-deps");

    support::wait_for(Duration::from_secs(15), Duration::from_millis(50), || {
        let output = project.anvil(["locks"]).ok().ok()?;
        let stdout = String::from_utf8(output.stdout).unwrap_or_default();
        stdout.contains("env:uno").then_some(())
    });

    project
        .anvil(["install-deps", "uno"])
        .timeout(Duration::from_secs(5))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("env:uno"))
        .stderr(predicate::str::contains("is held by pid"));

    let _ = first.kill();
    let _ = first.wait();
}

#[test]
fn locks_lists_the_owner_pid_while_a_request_is_in_flight() {
    let project = Project::new();

    let mut child = project
        .anvil(["install-deps", "uno"])
        .spawn()
        .expect("spawn anvil install-deps");
    let client_pid = child.id();

    let stdout = support::wait_for(Duration::from_secs(15), Duration::from_millis(50), || {
        let output = project.anvil(["locks"]).ok().ok()?;
        let stdout = String::from_utf8(output.stdout).unwrap_or_default();
        stdout.contains("env:uno").then_some(stdout)
    });

    assert!(
        stdout.contains(&format!("owner pid {client_pid}")),
        "expected lock owner to be the submitting client's own pid {client_pid}, got: {stdout}"
    );

    let _ = child.kill();
    let _ = child.wait();
}
