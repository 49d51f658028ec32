// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage-specific retry policy (spec §4.6).
//!
//! Retry counts and backoff constants are documented defaults, not a
//! configurable policy — grounded on the `shipper-retry` crate's
//! strategy-enum shape in the reference pack, but narrowed to the fixed
//! per-stage numbers the spec calls out, with the constants kept visible
//! here rather than behind a config file (no config-file parser exists in
//! this workspace — see `anvil_core::manifest`).

use std::time::Duration;

/// Download stage: transient I/O (connection reset, timeout, OS-level
/// I/O error) is retried up to 3 times with exponential backoff
/// 1s / 2s / 4s. HTTP 4xx responses are permanent and never retried.
pub const DOWNLOAD_MAX_ATTEMPTS: u32 = 3;
pub const DOWNLOAD_BACKOFF: [Duration; 3] =
    [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];

/// Unpack stage: permission-denied (antivirus holding a file briefly) is
/// retried up to 3 times with a flat 2s delay. Other errors are permanent.
pub const UNPACK_MAX_ATTEMPTS: u32 = 3;
pub const UNPACK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Install stage never retries automatically; a verification failure is
/// a defect signal, not a transient condition.
pub const INSTALL_MAX_ATTEMPTS: u32 = 1;

/// Backoff delay for the given zero-based download attempt number
/// (0 = the delay before the *first* retry, i.e. after attempt 1 failed).
pub fn download_backoff(attempt: u32) -> Duration {
    let last = DOWNLOAD_BACKOFF[DOWNLOAD_BACKOFF.len() - 1];
    DOWNLOAD_BACKOFF.get(attempt as usize).copied().unwrap_or(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_backoff_is_exponential() {
        assert_eq!(download_backoff(0), Duration::from_secs(1));
        assert_eq!(download_backoff(1), Duration::from_secs(2));
        assert_eq!(download_backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn download_backoff_saturates_past_the_table() {
        assert_eq!(download_backoff(10), Duration::from_secs(4));
    }
}
