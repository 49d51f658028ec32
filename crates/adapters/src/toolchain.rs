// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-invocation collaborator used by the compiler, linker,
//! post-processor, and uploader call sites in `anvil_build` and
//! `anvil_device`. Those crates depend on [`ProcessRunner`] rather than
//! calling [`crate::subprocess`] directly, so their tests can substitute
//! [`fake::FakeProcessRunner`] and assert on the argv each stage would
//! have invoked without actually compiling or flashing anything.

use async_trait::async_trait;

use crate::subprocess::{self, CapturedOutput, Invocation, SpawnError};

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion and return whatever exit code resulted — callers
    /// decide for themselves whether a nonzero code is fatal (a linker
    /// failure is, but an uploader's verify pass might retry).
    async fn run(&self, invocation: &Invocation) -> Result<CapturedOutput, SpawnError>;

    /// Run to completion, streaming stdout lines as they arrive, used by
    /// the build orchestrator to surface compiler progress incrementally.
    async fn run_streaming(
        &self,
        invocation: &Invocation,
        on_line: &mut (dyn FnMut(&str) + Send),
    ) -> Result<CapturedOutput, SpawnError>;
}

pub struct RealProcessRunner;

impl RealProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for RealProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CapturedOutput, SpawnError> {
        subprocess::run_allow_failure(invocation).await
    }

    async fn run_streaming(
        &self,
        invocation: &Invocation,
        on_line: &mut (dyn FnMut(&str) + Send),
    ) -> Result<CapturedOutput, SpawnError> {
        subprocess::run_streaming(invocation, |line| on_line(line)).await
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// A scripted runner keyed by program name. Each call records the
    /// full invocation it received (for argv assertions) and returns the
    /// next scripted outcome for that program, or a synthetic success
    /// with empty output if nothing was scripted.
    #[derive(Default)]
    pub struct FakeProcessRunner {
        scripted: Mutex<HashMap<String, Vec<Result<CapturedOutput, SpawnError>>>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl FakeProcessRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(&self, program: &str, outcome: Result<CapturedOutput, SpawnError>) {
            self.scripted.lock().entry(program.to_string()).or_default().push(outcome);
        }

        pub fn script_success(&self, program: &str, stdout: impl Into<String>) {
            self.script(
                program,
                Ok(CapturedOutput { exit_code: 0, stdout: stdout.into(), stderr: String::new() }),
            );
        }

        pub fn script_failure(&self, program: &str, exit_code: i32, stderr: impl Into<String>) {
            self.script(
                program,
                Ok(CapturedOutput { exit_code, stdout: String::new(), stderr: stderr.into() }),
            );
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().clone()
        }
    }

    fn next_outcome(scripted: &Mutex<HashMap<String, Vec<Result<CapturedOutput, SpawnError>>>>, program: &str) -> Result<CapturedOutput, SpawnError> {
        let mut map = scripted.lock();
        match map.get_mut(program).filter(|queue| !queue.is_empty()) {
            Some(queue) => queue.remove(0),
            None => Ok(CapturedOutput { exit_code: 0, stdout: String::new(), stderr: String::new() }),
        }
    }

    #[async_trait]
    impl ProcessRunner for FakeProcessRunner {
        async fn run(&self, invocation: &Invocation) -> Result<CapturedOutput, SpawnError> {
            self.calls.lock().push(invocation.clone());
            next_outcome(&self.scripted, &invocation.program)
        }

        async fn run_streaming(
            &self,
            invocation: &Invocation,
            on_line: &mut (dyn FnMut(&str) + Send),
        ) -> Result<CapturedOutput, SpawnError> {
            self.calls.lock().push(invocation.clone());
            let outcome = next_outcome(&self.scripted, &invocation.program);
            if let Ok(ref output) = outcome {
                for line in output.stdout.lines() {
                    on_line(line);
                }
            }
            outcome
        }
    }
}

#[cfg(test)]
#[path = "toolchain_tests.rs"]
mod tests;
