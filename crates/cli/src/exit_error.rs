// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type that carries a process exit code (spec §6 exit code
//! mapping: success 0, failure 1, cancelled 130).
//!
//! Commands return `ExitError` instead of calling `std::process::exit`
//! directly, so `main` is the single place that terminates the process.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(1, message)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<anvil_core::RequestStatus> for ExitError {
    /// Only meaningful for non-`Succeeded` terminal statuses — callers
    /// check `status.exit_code()` first and return `Ok(())` on success
    /// rather than constructing this for the happy path.
    fn from(status: anvil_core::RequestStatus) -> Self {
        Self::new(status.exit_code().unwrap_or(1), format!("request {status}"))
    }
}
