use super::fake::FakeProcessRunner;
use super::*;

#[tokio::test]
async fn real_process_runner_runs_a_successful_command() {
    let runner = RealProcessRunner::new();
    let cwd = std::env::temp_dir();
    let invocation = if cfg!(windows) {
        Invocation::new("cmd", cwd).arg("/C").arg("echo").arg("hi")
    } else {
        Invocation::new("echo", cwd).arg("hi")
    };
    let output = runner.run(&invocation).await.unwrap();
    assert_eq!(output.exit_code, 0);
}

#[tokio::test]
async fn fake_runner_records_every_call_and_replays_scripted_outcomes() {
    let runner = FakeProcessRunner::new();
    runner.script_success("cc", "compiled ok");
    runner.script_failure("cc", 1, "syntax error");

    let invocation = Invocation::new("cc", "/tmp").arg("-c").arg("main.c");
    let first = runner.run(&invocation).await.unwrap();
    let second = runner.run(&invocation).await.unwrap();

    assert_eq!(first.exit_code, 0);
    assert_eq!(second.exit_code, 1);
    assert_eq!(second.stderr, "syntax error");
    assert_eq!(runner.calls().len(), 2);
    assert_eq!(runner.calls()[0].args, vec!["-c", "main.c"]);
}

#[tokio::test]
async fn fake_runner_defaults_to_synthetic_success_when_nothing_is_scripted() {
    let runner = FakeProcessRunner::new();
    let output = runner.run(&Invocation::new("ld", "/tmp")).await.unwrap();
    assert_eq!(output.exit_code, 0);
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn fake_runner_streams_scripted_stdout_lines() {
    let runner = FakeProcessRunner::new();
    runner.script_success("esptool", "writing at 0x1000\nverifying\n");

    let mut lines = Vec::new();
    let invocation = Invocation::new("esptool", "/tmp");
    let output = runner.run_streaming(&invocation, &mut |line| lines.push(line.to_string())).await.unwrap();

    assert_eq!(output.exit_code, 0);
    assert_eq!(lines, vec!["writing at 0x1000", "verifying"]);
}
