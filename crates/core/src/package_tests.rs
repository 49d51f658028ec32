use super::*;
use std::collections::HashSet;

#[test]
fn stage_next_follows_pipeline_order() {
    assert_eq!(Stage::Pending.next(), Some(Stage::Downloading));
    assert_eq!(Stage::Downloading.next(), Some(Stage::Unpacking));
    assert_eq!(Stage::Unpacking.next(), Some(Stage::Installing));
    assert_eq!(Stage::Installing.next(), Some(Stage::Done));
    assert_eq!(Stage::Done.next(), None);
    assert_eq!(Stage::Failed.next(), None);
    assert_eq!(Stage::Cancelled.next(), None);
}

#[test]
fn terminal_stages() {
    assert!(Stage::Done.is_terminal());
    assert!(Stage::Failed.is_terminal());
    assert!(Stage::Cancelled.is_terminal());
    assert!(!Stage::Pending.is_terminal());
    assert!(!Stage::Downloading.is_terminal());
}

#[test]
fn task_with_no_deps_is_always_ready() {
    let task = PackageTask::new("platform-esp32", "3.3.5", "https://x/y.zip");
    assert!(task.is_ready(&HashSet::new()));
}

#[test]
fn task_is_ready_only_once_all_deps_done() {
    let dep = PackageTaskId::new();
    let task = PackageTask::new("framework-arduino", "2.0.0", "https://x/y.zip").with_deps(vec![dep]);
    assert!(!task.is_ready(&HashSet::new()));
    let mut done = HashSet::new();
    done.insert(dep);
    assert!(task.is_ready(&done));
}

#[test]
fn non_pending_task_is_never_ready() {
    let mut task = PackageTask::new("toolchain-xtensa", "1.0.0", "https://x/y.zip");
    task.stage = Stage::Downloading;
    assert!(!task.is_ready(&HashSet::new()));
}

#[test]
fn mark_failed_sets_stage_and_reason() {
    let mut task = PackageTask::new("lib-foo", "1.0.0", "https://x/y.zip");
    let upstream = PackageTaskId::new();
    task.mark_failed(TaskFailureReason::DependencyFailed { upstream });
    assert_eq!(task.stage, Stage::Failed);
    assert!(matches!(task.failure, Some(TaskFailureReason::DependencyFailed { .. })));
}

#[test]
fn install_key_is_name_version_url_triple() {
    let task = PackageTask::new("platform-esp32", "3.3.5", "https://x/y.zip");
    assert_eq!(
        task.install_key(),
        ("platform-esp32".to_string(), "3.3.5".to_string(), "https://x/y.zip".to_string())
    );
}

#[test]
fn builder_defaults_to_pending() {
    let task = PackageTask::builder().build();
    assert_eq!(task.stage, Stage::Pending);
    assert!(task.deps.is_empty());
}
