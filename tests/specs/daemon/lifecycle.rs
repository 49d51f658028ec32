// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon bootstrap/status/shutdown lifecycle (spec §4.1, §6).

use predicates::prelude::*;

use crate::support;
use crate::support::Project;

#[test]
fn status_reports_not_running_before_any_daemon_has_started() {
    let project = Project::new();
    project.anvil(["status"]).assert().success().stdout(predicate::str::contains("status: not running"));
}

#[test]
fn a_request_bootstraps_the_daemon_and_status_then_reports_it_running() {
    let project = Project::new();

    // `install-deps` against an unreachable registry still bootstraps the
    // daemon and reports a pid before the download itself ever resolves —
    // this only waits on the accept path, not the terminal frame, so kill
    // the request's owning client immediately after to avoid waiting out
    // the retry chain.
    let mut child = project
        .anvil(["install-deps", "uno"])
        .spawn()
        .expect("spawn anvil install-deps");

    support::wait_for(std::time::Duration::from_secs(15), std::time::Duration::from_millis(100), || {
        let output = project.anvil(["status"]).ok().ok()?;
        let stdout = String::from_utf8(output.stdout).unwrap_or_default();
        stdout.contains("status: running").then_some(())
    });

    project
        .anvil(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: running"))
        .stdout(predicate::str::contains("pid:"))
        .stdout(predicate::str::contains("active requests:"));

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn shutdown_stops_a_running_daemon_and_status_reflects_it() {
    let project = Project::new();

    // `status`/`devices` only probe for an existing daemon — they never
    // bootstrap one — so a real submission is needed to bring one up.
    let mut child = project
        .anvil(["install-deps", "uno"])
        .spawn()
        .expect("spawn anvil install-deps");

    support::wait_for(std::time::Duration::from_secs(15), std::time::Duration::from_millis(100), || {
        let output = project.anvil(["status"]).ok().ok()?;
        let stdout = String::from_utf8(output.stdout).unwrap_or_default();
        stdout.contains("status: running").then_some(())
    });

    project.anvil(["shutdown"]).assert().success().stdout(predicate::str::contains("shutdown requested"));

    support::wait_for(std::time::Duration::from_secs(5), std::time::Duration::from_millis(100), || {
        let output = project.anvil(["status"]).ok().ok()?;
        let stdout = String::from_utf8(output.stdout).unwrap_or_default();
        stdout.contains("status: not running").then_some(())
    });

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn shutdown_with_no_daemon_running_is_a_clean_no_op() {
    let project = Project::new();
    project.anvil(["shutdown"]).assert().success().stdout(predicate::str::contains("daemon not running"));
}

#[test]
fn install_deps_against_an_unknown_environment_fails_cleanly() {
    let project = Project::new();
    project
        .anvil(["install-deps", "does-not-exist"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown environment"));
}

#[test]
fn devices_reports_not_running_without_bootstrapping_a_daemon() {
    let project = Project::new();
    // `devices`/`status`/`locks` are read-only probes: unlike `build`,
    // `deploy`, `install-deps` and `monitor` they must never themselves
    // spawn a daemon just to answer a query.
    project.anvil(["devices"]).assert().success().stdout(predicate::str::contains("status: not running"));
    project.anvil(["status"]).assert().success().stdout(predicate::str::contains("status: not running"));
}
