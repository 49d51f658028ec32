// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The serial monitor WebSocket message envelope (spec §6).
//!
//! Lines are delivered at-least-once: `data` carries a monotonic index
//! that the reader echoes back in its next `write`/`ping` round so the
//! device coordinator knows what has been observed. Callers deduplicate
//! by index, not by content.

use anvil_core::SerialLine;
use serde::{Deserialize, Serialize};

/// Client → server messages on a `/api/monitor` WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorClientMessage {
    Attach,
    Write { data: String },
    Detach,
    Ping,
}

/// Server → client messages on a `/api/monitor` WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorServerMessage {
    /// Reports success or failure of the preceding `attach`.
    Attached { ok: bool, error: Option<String> },
    /// An ordered batch of lines since the last delivered index.
    Data { lines: Vec<SerialLine> },
    /// A deploy preempted this session; the port is about to close.
    Preempted,
    /// The port reopened after a preempting deploy completed.
    Reconnected,
    /// Acknowledges a `write` was delivered to the port.
    WriteAck,
    Error { message: String },
    Pong,
}
