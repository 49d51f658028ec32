// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request bodies for the HTTP submission routes.

use anvil_core::RequestId;
use serde::{Deserialize, Serialize};

/// Parallelism selection carried over the wire for `/api/build`
/// (mirrors `anvil_core::ParallelismMode` but as a flat, client-friendly shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelismWire {
    Serial,
    Default,
    Custom { n: usize },
}

impl From<ParallelismWire> for anvil_core::ParallelismMode {
    fn from(wire: ParallelismWire) -> Self {
        match wire {
            ParallelismWire::Serial => anvil_core::ParallelismMode::Serial,
            ParallelismWire::Default => anvil_core::ParallelismMode::Default,
            ParallelismWire::Custom { n } => anvil_core::ParallelismMode::Custom { n },
        }
    }
}

/// Every submission carries the caller's own pid (spec §4.4): lock
/// contention and the dead-client cancellation sweep both key off it, and
/// neither means anything if every submission were attributed to the
/// daemon's own pid instead of the process that actually asked for the
/// work. Defaults to the daemon's pid only so an old client that predates
/// this field still deserializes instead of failing closed.
fn default_caller_pid() -> u32 {
    std::process::id()
}

/// Body of `POST /api/build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParams {
    pub environment: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub parallelism: Option<ParallelismWire>,
    #[serde(default = "default_caller_pid")]
    pub caller_pid: u32,
}

/// Body of `POST /api/deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployParams {
    pub environment: String,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_caller_pid")]
    pub caller_pid: u32,
}

/// Body of `POST /api/monitor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorParams {
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_caller_pid")]
    pub caller_pid: u32,
}

fn default_baud() -> u32 {
    9600
}

/// Body of `POST /api/install-deps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallDependenciesParams {
    pub environment: String,
    #[serde(default = "default_caller_pid")]
    pub caller_pid: u32,
}

/// Response to a streaming submission: the request was accepted and a
/// WebSocket URL is available for progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub request_id: RequestId,
    pub stream_url: String,
}
