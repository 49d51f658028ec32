// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The one hygienic spawn helper every external invocation in the system
//! goes through — compiler, linker, post-processor, uploader, archive
//! tools. No call site in this crate or any downstream crate should call
//! `tokio::process::Command::new(..).spawn()` directly.
//!
//! Hygiene means: stdin is closed by default (external tools never block
//! waiting on a TTY that will never come), and on Windows no console
//! window flashes up for each invocation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {command}: {source}")]
    Spawn { command: String, source: std::io::Error },
    #[error("{command} exited with status {code}")]
    NonZeroExit { command: String, code: i32 },
    #[error("{command} did not produce an exit code (terminated by signal)")]
    NoExitCode { command: String },
    #[error("{command} timed out after {elapsed:?}")]
    Timeout { command: String, elapsed: Duration },
}

/// A process invocation request: argv, cwd, and extra environment
/// variables layered on top of the daemon's own environment.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), cwd: cwd.into(), env: BTreeMap::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.clone()).chain(self.args.iter().cloned()).collect::<Vec<_>>().join(" ")
    }

    /// Build a [`tokio::process::Command`] with hygiene applied: stdin
    /// closed, no console window on Windows. Stdout/stderr are left for
    /// the caller to configure (piped for capture, inherited for the
    /// serial monitor passthrough, etc).
    fn build(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd.current_dir(&self.cwd);
        cmd.envs(&self.env);
        cmd.stdin(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }
}

/// Output captured from a completed hygienic invocation.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn `invocation`, capture stdout/stderr, and wait for completion.
/// Returns [`SpawnError::NonZeroExit`] on a nonzero exit code — callers
/// that need to inspect output on failure should use [`run_allow_failure`]
/// instead.
pub async fn run(invocation: &Invocation) -> Result<CapturedOutput, SpawnError> {
    let output = run_allow_failure(invocation).await?;
    if output.exit_code != 0 {
        return Err(SpawnError::NonZeroExit { command: invocation.command_line(), code: output.exit_code });
    }
    Ok(output)
}

/// Like [`run`], but returns successfully regardless of exit code — the
/// caller inspects `exit_code` itself. Used by the compilation pool,
/// which needs the captured stderr of a *failing* compile to report back
/// to the caller.
pub async fn run_allow_failure(invocation: &Invocation) -> Result<CapturedOutput, SpawnError> {
    let mut cmd = invocation.build();
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let child = cmd.spawn().map_err(|source| SpawnError::Spawn { command: invocation.command_line(), source })?;
    let output = child
        .wait_with_output()
        .await
        .map_err(|source| SpawnError::Spawn { command: invocation.command_line(), source })?;

    let exit_code = output
        .status
        .code()
        .ok_or_else(|| SpawnError::NoExitCode { command: invocation.command_line() })?;

    Ok(CapturedOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Spawn `invocation` with stdout/stderr piped, and stream stdout lines to
/// `on_line` as they arrive rather than waiting for completion. Used by
/// the build orchestrator for long-running compiler/linker invocations
/// whose progress should surface incrementally.
pub async fn run_streaming<F>(invocation: &Invocation, mut on_line: F) -> Result<CapturedOutput, SpawnError>
where
    F: FnMut(&str),
{
    let mut cmd = invocation.build();
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child: Child = cmd.spawn().map_err(|source| SpawnError::Spawn { command: invocation.command_line(), source })?;
    let stdout = child.stdout.take().unwrap_or_else(|| unreachable!("stdout was piped above"));
    let mut stderr = child.stderr.take().unwrap_or_else(|| unreachable!("stderr was piped above"));

    let mut reader = BufReader::new(stdout).lines();
    let mut stdout_buf = String::new();
    while let Some(line) = reader
        .next_line()
        .await
        .map_err(|source| SpawnError::Spawn { command: invocation.command_line(), source })?
    {
        on_line(&line);
        stdout_buf.push_str(&line);
        stdout_buf.push('\n');
    }

    let mut stderr_buf = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut stderr, &mut stderr_buf)
        .await
        .map_err(|source| SpawnError::Spawn { command: invocation.command_line(), source })?;

    let status = child
        .wait()
        .await
        .map_err(|source| SpawnError::Spawn { command: invocation.command_line(), source })?;
    let exit_code = status.code().ok_or_else(|| SpawnError::NoExitCode { command: invocation.command_line() })?;

    Ok(CapturedOutput { exit_code, stdout: stdout_buf, stderr: String::from_utf8_lossy(&stderr_buf).into_owned() })
}

/// Spawn `invocation` for long-lived interactive use (the serial monitor's
/// upload-preemption path doesn't apply here, but a future native-tool
/// passthrough would) and hand back the raw [`Child`] so the caller owns
/// its own kill/wait lifecycle. Hygiene (null stdin, hidden console) is
/// still applied.
pub fn spawn_detached(invocation: &Invocation) -> Result<Child, SpawnError> {
    let mut cmd = invocation.build();
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.spawn().map_err(|source| SpawnError::Spawn { command: invocation.command_line(), source })
}

pub fn exists_on_path(program: &str) -> bool {
    which(program).is_some()
}

fn which(program: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe_candidate = dir.join(format!("{program}.exe"));
            if exe_candidate.is_file() {
                return Some(exe_candidate);
            }
        }
    }
    None
}

pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).map(|m| m.permissions().mode() & 0o111 != 0).unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
