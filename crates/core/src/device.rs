// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device session vocabulary shared between `anvil-daemon::locks` (lease
//! acquisition) and `anvil-device` (port leasing, monitor multiplexing).

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies one monitor attachment to a physical serial port.
    pub struct DeviceSessionId("dev-");
}

/// Lease mode requested against a port (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseMode {
    /// Non-exclusive: arbitrarily many readers share one port handle.
    Reader,
    /// Exclusive among writers, coexists with readers.
    Writer,
    /// Exclusive; preempts all readers and writers.
    Deploy,
}

crate::simple_display! {
    LeaseMode {
        Reader => "reader",
        Writer => "writer",
        Deploy => "deploy",
    }
}

impl LeaseMode {
    /// Whether acquiring this mode preempts existing leases rather than
    /// waiting for them to release.
    pub fn preempts_existing(self) -> bool {
        matches!(self, LeaseMode::Deploy)
    }

    /// Whether this mode can coexist with an active reader lease.
    pub fn coexists_with_readers(self) -> bool {
        matches!(self, LeaseMode::Reader | LeaseMode::Writer)
    }
}

/// One line of serial output held in a device session's bounded ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialLine {
    /// Monotonic index, echoed back by readers to request the next batch.
    pub index: u64,
    pub text: String,
}
