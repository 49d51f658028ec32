// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only query bodies and their result shapes.

use serde::{Deserialize, Serialize};

/// `GET /api/devices/list` result entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub port: String,
    pub description: Option<String>,
    /// `None` when the port is free.
    pub leased_by: Option<u32>,
}

/// `POST /api/locks/status` result entry (mirrors `anvil_core::LockStatus`
/// with the lease id rendered as a plain string for the client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub name: String,
    pub owner_pid: u32,
    pub lease_id: String,
    pub age_ms: u64,
}

impl From<&anvil_core::LockStatus> for LockInfo {
    fn from(status: &anvil_core::LockStatus) -> Self {
        Self {
            name: status.name.clone(),
            owner_pid: status.owner_pid,
            lease_id: status.lease_id.to_string(),
            age_ms: status.age_ms,
        }
    }
}

/// `GET /api/daemon/status` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub pid: u32,
    pub protocol_version: u32,
    pub active_requests: usize,
    pub uptime_ms: u64,
}

/// Tagged query sent to administrative/read-only routes. Each route maps
/// to exactly one variant, enumerated here so the exhaustiveness check in
/// `exhaustiveness_tests` has a single match to verify against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    ListDevices,
    LocksStatus,
    DaemonStatus,
    DaemonVersion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_variants_round_trip_through_json() {
        for q in [Query::ListDevices, Query::LocksStatus, Query::DaemonStatus, Query::DaemonVersion] {
            let json = serde_json::to_string(&q).unwrap();
            let back: Query = serde_json::from_str(&json).unwrap();
            assert_eq!(q, back);
        }
    }

    #[test]
    fn lock_info_converts_from_core_status() {
        let status = anvil_core::LockStatus {
            name: "env:uno".into(),
            owner_pid: 77,
            lease_id: anvil_core::LeaseId::new(),
            age_ms: 10,
        };
        let info = LockInfo::from(&status);
        assert_eq!(info.name, "env:uno");
        assert_eq!(info.owner_pid, 77);
        assert_eq!(info.age_ms, 10);
    }
}
