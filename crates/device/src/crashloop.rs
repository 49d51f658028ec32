// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-loop recovery (spec §4.8): devices that reboot-crash continually
//! get a bounded, randomized-gap retry loop around the upload attempt
//! rather than either a single shot or silent unbounded retry. Each
//! attempt is reported, never hidden.

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Up to ~20 attempts (spec §4.8).
pub const MAX_ATTEMPTS: u32 = 20;
/// Randomized gap between attempts, 100-1500ms (spec §4.8).
pub const GAP_RANGE: Range<u64> = 100..1500;

/// One attempt's result, reported via the callback passed to
/// [`run_crash_loop`] regardless of the eventual overall outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The upload ran and a connection was confirmed established.
    Established,
    /// The upload failed or no connection was observed; worth retrying.
    Failed { reason: String },
}

/// The overall result of the recovery loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashLoopOutcome {
    Established { attempt: u32 },
    ExhaustedAttempts { attempts: u32, last_reason: String },
}

/// Injected so tests don't sleep 100-1500ms per attempt for up to 20
/// attempts; grounded on the same testable-time discipline as
/// `anvil_core::clock::Clock`.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct RealSleeper;

#[async_trait]
impl Sleeper for RealSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `attempt` up to [`MAX_ATTEMPTS`] times with a randomized gap between
/// tries, stopping as soon as one attempt reports
/// [`AttemptOutcome::Established`]. `on_attempt` is called after every
/// attempt (including the last) so callers can surface progress.
pub async fn run_crash_loop<A, F, S>(mut attempt: A, mut on_attempt: F, sleeper: &S) -> CrashLoopOutcome
where
    A: FnMut(u32) -> std::pin::Pin<Box<dyn std::future::Future<Output = AttemptOutcome> + Send>>,
    F: FnMut(u32, &AttemptOutcome),
    S: Sleeper + ?Sized,
{
    let mut last_reason = String::new();
    for n in 1..=MAX_ATTEMPTS {
        let outcome = attempt(n).await;
        on_attempt(n, &outcome);
        match outcome {
            AttemptOutcome::Established => return CrashLoopOutcome::Established { attempt: n },
            AttemptOutcome::Failed { reason } => last_reason = reason,
        }
        if n < MAX_ATTEMPTS {
            let gap_ms = rand::thread_rng().gen_range(GAP_RANGE);
            sleeper.sleep(Duration::from_millis(gap_ms)).await;
        }
    }
    CrashLoopOutcome::ExhaustedAttempts { attempts: MAX_ATTEMPTS, last_reason }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Records every requested duration without actually sleeping.
    #[derive(Default)]
    pub struct InstantSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl InstantSleeper {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn slept(&self) -> Vec<Duration> {
            self.slept.lock().clone()
        }
    }

    #[async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::InstantSleeper;
    use super::*;

    #[tokio::test]
    async fn stops_as_soon_as_a_connection_establishes() {
        let sleeper = InstantSleeper::new();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let outcome = run_crash_loop(
            |n| {
                attempts.store(n, std::sync::atomic::Ordering::SeqCst);
                Box::pin(async move {
                    if n < 3 {
                        AttemptOutcome::Failed { reason: "reboot loop".into() }
                    } else {
                        AttemptOutcome::Established
                    }
                })
            },
            |_, _| {},
            &sleeper,
        )
        .await;

        assert_eq!(outcome, CrashLoopOutcome::Established { attempt: 3 });
        assert_eq!(sleeper.slept().len(), 2, "one gap between each of the first 3 attempts minus the last");
    }

    #[tokio::test]
    async fn exhausts_all_attempts_and_reports_each_one() {
        let sleeper = InstantSleeper::new();
        let mut reported = Vec::new();
        let outcome = run_crash_loop(
            |_| Box::pin(async { AttemptOutcome::Failed { reason: "still crashing".into() } }),
            |n, outcome| reported.push((n, outcome.clone())),
            &sleeper,
        )
        .await;

        assert_eq!(outcome, CrashLoopOutcome::ExhaustedAttempts { attempts: MAX_ATTEMPTS, last_reason: "still crashing".into() });
        assert_eq!(reported.len(), MAX_ATTEMPTS as usize);
        assert_eq!(sleeper.slept().len(), (MAX_ATTEMPTS - 1) as usize);
    }

    #[tokio::test]
    async fn gaps_fall_within_the_documented_range() {
        let sleeper = InstantSleeper::new();
        run_crash_loop(
            |_| Box::pin(async { AttemptOutcome::Failed { reason: "x".into() } }),
            |_, _| {},
            &sleeper,
        )
        .await;

        for gap in sleeper.slept() {
            assert!(gap.as_millis() >= GAP_RANGE.start as u128);
            assert!(gap.as_millis() < GAP_RANGE.end as u128);
        }
    }
}
