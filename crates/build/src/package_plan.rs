// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The adapter that turns one [`Environment`] into an install DAG (spec
//! §4.6 "domain ordering"): `platform → toolchain → framework → libraries`.
//! This module owns the environment-specific edge-building; the generic
//! DAG policy itself (cycle checking, ready-set evaluation) lives in
//! `anvil_engine::dag` and never sees an `Environment`.
//!
//! Package identity (name, version, fetch URL) is synthesized from the
//! environment and a package registry base URL — real package indices are
//! out of scope (spec §1 Non-goals), so this stands in for whatever
//! front-end would otherwise resolve a platform/board/library name to a
//! concrete release artifact.

use anvil_core::{Environment, PackageTask};

/// Base URL packages are resolved against. A real deployment would read
/// this from the manifest or an index file; fixed here since there is no
/// registry front-end in scope.
const REGISTRY_BASE: &str = "https://packages.anvil.invalid";

fn url_for(kind: &str, name: &str, version: &str) -> String {
    format!("{REGISTRY_BASE}/{kind}/{name}-{version}.tar.gz")
}

/// Build the install DAG for `env`: one task each for the platform
/// definition, its toolchain, the framework source tree, and every
/// declared library — wired platform → toolchain → framework → libraries,
/// exactly the edge order spec §4.6 calls "domain ordering". The generic
/// scheduler in `anvil_engine::pipeline` takes it from here.
pub fn plan_install_tasks(env: &Environment) -> Vec<PackageTask> {
    let platform_version = "3.3.5";
    let framework_version = "2.0.14";

    let platform = PackageTask::new(
        format!("platform-{}", env.platform),
        platform_version,
        url_for("platform", &env.platform, platform_version),
    );

    let toolchain = PackageTask::new(
        format!("toolchain-{}", env.platform),
        platform_version,
        url_for("toolchain", &env.platform, platform_version),
    )
    .with_deps(vec![platform.id]);

    let framework = PackageTask::new(
        format!("framework-{}", env.framework),
        framework_version,
        url_for("framework", &env.framework, framework_version),
    )
    .with_deps(vec![toolchain.id]);

    let mut tasks = vec![platform, toolchain, framework];
    let framework_id = tasks[2].id;

    for lib in &env.libraries {
        let version = lib.version.as_deref().unwrap_or("latest");
        let task = PackageTask::new(format!("library-{}", lib.name), version, url_for("library", &lib.name, version))
            .with_deps(vec![framework_id]);
        tasks.push(task);
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::Stage;

    fn sample_env() -> Environment {
        Environment {
            platform: "espressif32".into(),
            board: "esp32-c6-devkitm-1".into(),
            framework: "arduino".into(),
            libraries: vec![
                anvil_core::LibRef { name: "Adafruit NeoPixel".into(), version: Some("1.11.0".into()) },
                anvil_core::LibRef { name: "ArduinoJson".into(), version: None },
            ],
            build_flags: vec![],
            upload_port: None,
        }
    }

    #[test]
    fn four_tasks_for_one_platform_one_framework_two_libraries() {
        let tasks = plan_install_tasks(&sample_env());
        assert_eq!(tasks.len(), 5);
        assert!(tasks.iter().all(|t| t.stage == Stage::Pending));
    }

    #[test]
    fn toolchain_depends_on_platform() {
        let tasks = plan_install_tasks(&sample_env());
        let platform = tasks.iter().find(|t| t.name.starts_with("platform-")).unwrap();
        let toolchain = tasks.iter().find(|t| t.name.starts_with("toolchain-")).unwrap();
        assert_eq!(toolchain.deps, vec![platform.id]);
    }

    #[test]
    fn libraries_depend_on_framework_not_on_each_other() {
        let tasks = plan_install_tasks(&sample_env());
        let framework = tasks.iter().find(|t| t.name.starts_with("framework-")).unwrap();
        let libraries: Vec<_> = tasks.iter().filter(|t| t.name.starts_with("library-")).collect();
        assert_eq!(libraries.len(), 2);
        for lib in libraries {
            assert_eq!(lib.deps, vec![framework.id]);
        }
    }

    #[test]
    fn library_with_no_version_resolves_to_latest() {
        let tasks = plan_install_tasks(&sample_env());
        let any_json = tasks.iter().find(|t| t.name == "library-ArduinoJson").unwrap();
        assert_eq!(any_json.version, "latest");
    }

    #[test]
    fn no_libraries_still_produces_the_three_core_tasks() {
        let mut env = sample_env();
        env.libraries.clear();
        let tasks = plan_install_tasks(&env);
        assert_eq!(tasks.len(), 3);
    }
}
