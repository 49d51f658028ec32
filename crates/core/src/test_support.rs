// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::cache::Fingerprint;
use crate::manifest::Environment;
use crate::package::{PackageTask, PackageTaskId, Stage};
use crate::request::{CallerIdentity, Request, RequestKind};
use std::path::PathBuf;

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::package::Stage;
    use proptest::prelude::*;

    pub fn arb_stage() -> impl Strategy<Value = Stage> {
        prop_oneof![
            Just(Stage::Pending),
            Just(Stage::Downloading),
            Just(Stage::Unpacking),
            Just(Stage::Installing),
            Just(Stage::Done),
            Just(Stage::Failed),
            Just(Stage::Cancelled),
        ]
    }

    /// A small DAG shape: `n` tasks, each depending only on lower-indexed
    /// tasks, guaranteeing acyclicity by construction.
    pub fn arb_acyclic_dep_indices(n: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
        (0..n)
            .map(|i| prop::collection::vec(0..i.max(1), 0..i.min(3)).prop_map(move |mut deps| {
                deps.retain(|&d| d < i);
                deps.sort_unstable();
                deps.dedup();
                deps
            }))
            .collect::<Vec<_>>()
    }
}

pub fn sample_caller(pid: u32) -> CallerIdentity {
    CallerIdentity { pid, cwd: PathBuf::from("/test/project") }
}

pub fn sample_request(kind: RequestKind) -> Request {
    Request::new(kind, sample_caller(1000), serde_json::json!({}), 1_000_000)
}

pub fn sample_fingerprint(seed: u8) -> Fingerprint {
    Fingerprint::from_bytes([seed; 32])
}

pub fn sample_task(name: &str, deps: Vec<PackageTaskId>) -> PackageTask {
    PackageTask::new(name, "1.0.0", format!("https://example.invalid/{name}.zip")).with_deps(deps)
}

pub fn sample_task_at_stage(name: &str, stage: Stage) -> PackageTask {
    let mut task = PackageTask::new(name, "1.0.0", format!("https://example.invalid/{name}.zip"));
    task.stage = stage;
    task
}

pub fn sample_environment() -> Environment {
    Environment {
        platform: "espressif32".to_string(),
        board: "esp32dev".to_string(),
        framework: "arduino".to_string(),
        libraries: Vec::new(),
        build_flags: vec!["-Wall".to_string(), "-std=gnu++17".to_string()],
        upload_port: None,
    }
}
