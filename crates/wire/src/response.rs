// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal responses and the error envelope every crate's `thiserror`
//! enum flattens into at the wire boundary.

use anvil_core::{ErrorKind, RequestId, RequestStatus};
use serde::{Deserialize, Serialize};

/// Returned by the short-lived synchronous routes (`install-deps`,
/// `locks/status`, `daemon/shutdown`) and as the final message on a
/// streaming connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalResponse {
    pub request_id: RequestId,
    pub status: RequestStatus,
    /// Process exit code convention: success 0, failure 1, cancelled 130.
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TerminalResponse {
    pub fn new(request_id: RequestId, status: RequestStatus, message: Option<String>) -> Self {
        let exit_code = status.exit_code().unwrap_or(1);
        Self { request_id, status, exit_code, message }
    }
}

/// A tagged response envelope wrapping either a successful payload or a
/// classified error. One error variant per [`ErrorKind`] classification so
/// a client can branch on `kind` without parsing `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok { value: serde_json::Value },
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn ok(value: serde_json::Value) -> Self {
        Response::Ok { value }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error { kind, message: message.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}
