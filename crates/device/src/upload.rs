// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upload watchdog (spec §4.8): the upload tool runs as a child process and
//! is raced against a dual (total, inactivity) timeout. The forced-
//! termination path uses the OS-level kill primitive directly — never the
//! subprocess abstraction's cooperative `wait()` — mirroring the teacher's
//! `CancellationToken`-raced `select!` idiom in `listener::handle_connection`,
//! generalized from "abandon the request" to "kill the child".

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;

use anvil_adapters::Invocation;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to spawn upload tool: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One running upload invocation, abstracted so the watchdog can be
/// exercised without spawning a real subprocess in tests.
#[async_trait]
pub trait UploadProcess: Send {
    /// Next stdout line, or `None` once the stream has closed.
    async fn next_line(&mut self) -> Option<String>;
    /// Resolves once the process has exited (call only after `next_line`
    /// has returned `None`).
    async fn wait(&mut self) -> i32;
    /// OS-level forced termination — not a cooperative shutdown request.
    fn start_kill(&mut self);
}

pub struct RealUploadProcess {
    child: Child,
    lines: tokio::io::Lines<BufReader<tokio::process::ChildStdout>>,
}

impl RealUploadProcess {
    pub fn spawn(invocation: &Invocation) -> Result<Self, UploadError> {
        let mut child = anvil_adapters::subprocess::spawn_detached(invocation)
            .map_err(|e| UploadError::Spawn(std::io::Error::other(e.to_string())))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            UploadError::Spawn(std::io::Error::other("upload child has no captured stdout"))
        })?;
        Ok(Self { child, lines: BufReader::new(stdout).lines() })
    }
}

#[async_trait]
impl UploadProcess for RealUploadProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.next_line().await.ok().flatten()
    }

    async fn wait(&mut self) -> i32 {
        self.child.wait().await.ok().and_then(|status| status.code()).unwrap_or(-1)
    }

    fn start_kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Why the watchdog stopped waiting on the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// The process exited on its own before either budget elapsed.
    Completed { exit_code: i32 },
    /// No output for the inactivity budget; the process was killed.
    InactivityTimeout,
    /// The total wall-clock budget elapsed; the process was killed.
    TotalTimeout,
}

/// Race `process` against the total and inactivity budgets, killing it at
/// the OS level the instant either elapses. Output lines reset the
/// inactivity timer but never the total one.
pub async fn run_with_watchdog(
    process: &mut dyn UploadProcess,
    total_budget: Duration,
    inactivity_budget: Duration,
) -> WatchdogOutcome {
    let deadline = tokio::time::Instant::now() + total_budget;

    loop {
        let inactivity_deadline = tokio::time::Instant::now() + inactivity_budget;
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => {
                process.start_kill();
                return WatchdogOutcome::TotalTimeout;
            }
            line = process.next_line() => {
                match line {
                    Some(_) => continue,
                    None => {
                        let exit_code = process.wait().await;
                        return WatchdogOutcome::Completed { exit_code };
                    }
                }
            }
            _ = tokio::time::sleep_until(inactivity_deadline) => {
                process.start_kill();
                return WatchdogOutcome::InactivityTimeout;
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::collections::VecDeque;

    pub enum ScriptedEvent {
        Line(String),
        Delay(Duration),
        Exit(i32),
    }

    /// A scripted process: plays back `events` in order. A `Delay` stalls
    /// `next_line` for that long before continuing, letting tests exercise
    /// the inactivity timeout without a real child process.
    pub struct FakeUploadProcess {
        events: VecDeque<ScriptedEvent>,
        exit_code: i32,
        killed: bool,
    }

    impl FakeUploadProcess {
        pub fn new(events: Vec<ScriptedEvent>) -> Self {
            Self { events: events.into(), exit_code: 0, killed: false }
        }

        pub fn was_killed(&self) -> bool {
            self.killed
        }
    }

    #[async_trait]
    impl UploadProcess for FakeUploadProcess {
        async fn next_line(&mut self) -> Option<String> {
            loop {
                match self.events.pop_front() {
                    Some(ScriptedEvent::Line(line)) => return Some(line),
                    Some(ScriptedEvent::Delay(d)) => tokio::time::sleep(d).await,
                    Some(ScriptedEvent::Exit(code)) => {
                        self.exit_code = code;
                        return None;
                    }
                    None => return None,
                }
            }
        }

        async fn wait(&mut self) -> i32 {
            self.exit_code
        }

        fn start_kill(&mut self) {
            self.killed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeUploadProcess, ScriptedEvent};
    use super::*;

    #[tokio::test]
    async fn completes_normally_when_process_exits_before_either_budget() {
        let mut process =
            FakeUploadProcess::new(vec![ScriptedEvent::Line("flashing".into()), ScriptedEvent::Exit(0)]);
        let outcome = run_with_watchdog(&mut process, Duration::from_secs(10), Duration::from_secs(10)).await;
        assert_eq!(outcome, WatchdogOutcome::Completed { exit_code: 0 });
        assert!(!process.was_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn inactivity_without_output_kills_the_process() {
        let mut process = FakeUploadProcess::new(vec![ScriptedEvent::Delay(Duration::from_secs(30))]);
        let outcome =
            run_with_watchdog(&mut process, Duration::from_secs(600), Duration::from_secs(5)).await;
        assert_eq!(outcome, WatchdogOutcome::InactivityTimeout);
        assert!(process.was_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn total_budget_kills_even_with_steady_output() {
        let mut process = FakeUploadProcess::new(vec![
            ScriptedEvent::Line("a".into()),
            ScriptedEvent::Delay(Duration::from_secs(2)),
            ScriptedEvent::Line("b".into()),
            ScriptedEvent::Delay(Duration::from_secs(2)),
            ScriptedEvent::Line("c".into()),
            ScriptedEvent::Delay(Duration::from_secs(2)),
            ScriptedEvent::Line("d".into()),
            ScriptedEvent::Delay(Duration::from_secs(2)),
        ]);
        let outcome = run_with_watchdog(&mut process, Duration::from_secs(5), Duration::from_secs(60)).await;
        assert_eq!(outcome, WatchdogOutcome::TotalTimeout);
        assert!(process.was_killed());
    }
}
