// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! anvil-device: the device coordinator (spec §4.8) — port leasing across
//! reader/writer/deploy modes, a shared line-oriented ring buffer per
//! port, the deploy preemption sequence, the upload watchdog, and
//! crash-loop recovery.

pub mod coordinator;
pub mod crashloop;
pub mod lease;
pub mod port;
pub mod ring;
pub mod upload;

pub use coordinator::DeviceCoordinator;
pub use crashloop::{run_crash_loop, AttemptOutcome, CrashLoopOutcome, RealSleeper, Sleeper, GAP_RANGE, MAX_ATTEMPTS};
pub use lease::{PortLeaseError, PortLeaseManager, PreemptedLeases};
pub use port::{list_available_ports, PortError, SerialPort, SerialPortFactory, TokioSerialPortFactory};
pub use ring::LineBuffer;
pub use upload::{run_with_watchdog, RealUploadProcess, UploadError, UploadProcess, WatchdogOutcome};
