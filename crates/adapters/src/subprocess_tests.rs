use super::*;

fn echo_invocation(arg: &str) -> Invocation {
    let cwd = std::env::temp_dir();
    if cfg!(windows) {
        Invocation::new("cmd", cwd).arg("/C").arg("echo").arg(arg)
    } else {
        Invocation::new("echo", cwd).arg(arg)
    }
}

#[tokio::test]
async fn run_captures_stdout_of_a_successful_command() {
    let output = run(&echo_invocation("hello-anvil")).await.unwrap();
    assert_eq!(output.exit_code, 0);
    assert!(output.stdout.contains("hello-anvil"));
}

#[tokio::test]
async fn run_reports_nonzero_exit_as_an_error() {
    let cwd = std::env::temp_dir();
    let invocation = if cfg!(windows) {
        Invocation::new("cmd", cwd).arg("/C").arg("exit").arg("3")
    } else {
        Invocation::new("sh", cwd).arg("-c").arg("exit 3")
    };
    let err = run(&invocation).await.unwrap_err();
    assert!(matches!(err, SpawnError::NonZeroExit { code: 3, .. }));
}

#[tokio::test]
async fn run_allow_failure_returns_output_on_nonzero_exit() {
    let cwd = std::env::temp_dir();
    let invocation = if cfg!(windows) {
        Invocation::new("cmd", cwd).arg("/C").arg("exit").arg("2")
    } else {
        Invocation::new("sh", cwd).arg("-c").arg("exit 2")
    };
    let output = run_allow_failure(&invocation).await.unwrap();
    assert_eq!(output.exit_code, 2);
}

#[tokio::test]
async fn run_streaming_delivers_each_line() {
    let cwd = std::env::temp_dir();
    let invocation = if cfg!(windows) {
        Invocation::new("cmd", cwd).arg("/C").arg("echo one&echo two")
    } else {
        Invocation::new("sh", cwd).arg("-c").arg("echo one; echo two")
    };
    let mut lines = Vec::new();
    let output = run_streaming(&invocation, |line| lines.push(line.to_string())).await.unwrap();
    assert_eq!(output.exit_code, 0);
    assert!(lines.iter().any(|l| l.contains("one")));
    assert!(lines.iter().any(|l| l.contains("two")));
}

#[tokio::test]
async fn spawn_failure_on_missing_binary_is_reported() {
    let invocation = Invocation::new("anvil-definitely-not-a-real-binary", std::env::temp_dir());
    let err = run(&invocation).await.unwrap_err();
    assert!(matches!(err, SpawnError::Spawn { .. }));
}

#[test]
fn exists_on_path_finds_a_well_known_binary() {
    let candidate = if cfg!(windows) { "cmd" } else { "sh" };
    assert!(exists_on_path(candidate));
}

#[test]
fn exists_on_path_rejects_a_nonsense_name() {
    assert!(!exists_on_path("anvil-definitely-not-a-real-binary"));
}

#[test]
fn invocation_builder_accumulates_args_and_env() {
    let invocation = Invocation::new("cc", "/tmp")
        .arg("-c")
        .args(["-O2", "-Wall"])
        .env("CC_FLAGS", "strict");
    assert_eq!(invocation.args, vec!["-c", "-O2", "-Wall"]);
    assert_eq!(invocation.env.get("CC_FLAGS").map(String::as_str), Some("strict"));
}
