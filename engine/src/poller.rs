//! Bounded fixed-interval polling
//!
//! Every convergence check in a deployment (host health, plugin state,
//! plugin version, manifest checksum, asset availability) is the same loop:
//! run an operation, test the result, sleep, repeat until the deadline.
//! Operation errors count as "not ready yet" and are never surfaced.
//!
//! A deadline expiring is a normal [`PollOutcome::TimedOut`] result, not an
//! error; callers decide whether that is fatal.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Interval between attempts unless configured otherwise
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Longest wait any single poll will honour; larger timeouts are clamped
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Deadline `timeout` after `start`, clamped to [`MAX_WAIT`]
pub fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start + timeout.min(MAX_WAIT)
}

/// Result of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The predicate accepted a value before the deadline
    Ready {
        value: T,
        elapsed: Duration,
        attempts: u32,
    },
    /// The deadline passed first
    TimedOut { elapsed: Duration, attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Ready { elapsed, .. } | PollOutcome::TimedOut { elapsed, .. } => *elapsed,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Ready { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            PollOutcome::Ready { value, .. } => Some(value),
            PollOutcome::TimedOut { .. } => None,
        }
    }

}

/// Fixed-interval retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Poll for at most `timeout`, starting now
    pub async fn poll_for<T, E, F, Fut, P>(
        &self,
        timeout: Duration,
        op: F,
        ready: P,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: FnMut(&T) -> bool,
    {
        self.poll_until(deadline_after(Instant::now(), timeout), op, ready).await
    }

    /// Poll until `deadline`
    ///
    /// The deadline is checked before every attempt, so an already expired
    /// deadline makes no attempt at all. Elapsed time is measured from this
    /// call, not from whenever the deadline was computed.
    pub async fn poll_until<T, E, F, Fut, P>(
        &self,
        deadline: Instant,
        mut op: F,
        mut ready: P,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: FnMut(&T) -> bool,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        while Instant::now() < deadline {
            attempts += 1;
            match op().await {
                Ok(value) if ready(&value) => {
                    return PollOutcome::Ready {
                        value,
                        elapsed: start.elapsed(),
                        attempts,
                    };
                }
                Ok(_) => trace!(attempt = attempts, "Not ready yet"),
                Err(e) => debug!(attempt = attempts, error = %e, "Poll attempt failed"),
            }

            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.interval).await;
        }

        PollOutcome::TimedOut {
            elapsed: start.elapsed(),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let poller = Poller::new(Duration::from_secs(2));

        let outcome = poller
            .poll_for(
                Duration::from_secs(30),
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok::<u32, String>(n)
                },
                |n| *n == 3,
            )
            .await;

        assert_eq!(outcome.attempts(), 3);
        assert_eq!(outcome.elapsed(), Duration::from_secs(4));
        assert_eq!(outcome.into_value(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_retried_not_surfaced() {
        let calls = AtomicU32::new(0);
        let poller = Poller::new(Duration::from_secs(2));

        let outcome = poller
            .poll_for(
                Duration::from_secs(30),
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("connection refused")
                    } else {
                        Ok(())
                    }
                },
                |_| true,
            )
            .await;

        assert!(outcome.is_ready());
        assert_eq!(outcome.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_deadline() {
        let poller = Poller::new(Duration::from_secs(2));

        let outcome = poller
            .poll_for(
                Duration::from_secs(10),
                || async { Ok::<bool, String>(false) },
                |done| *done,
            )
            .await;

        assert!(!outcome.is_ready());
        // Attempts at t = 0, 2, 4, 6, 8
        assert_eq!(outcome.attempts(), 5);
        assert_eq!(outcome.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_makes_no_attempt() {
        let calls = AtomicU32::new(0);
        let poller = Poller::default();
        let deadline = Instant::now();
        tokio::time::advance(Duration::from_millis(1)).await;

        let outcome = poller
            .poll_until(
                deadline,
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.attempts(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_does_not_overflow() {
        let calls = AtomicU32::new(0);
        let poller = Poller::default();

        let outcome = poller
            .poll_for(
                Duration::from_secs(u64::MAX),
                || async { Ok::<u32, String>(calls.fetch_add(1, Ordering::SeqCst) + 1) },
                |n| *n == 2,
            )
            .await;

        assert!(outcome.is_ready());
        assert_eq!(outcome.attempts(), 2);
    }

    #[tokio::test]
    async fn test_deadline_is_clamped() {
        let start = Instant::now();
        assert_eq!(deadline_after(start, Duration::MAX), start + MAX_WAIT);
        assert_eq!(
            deadline_after(start, Duration::from_secs(5)),
            start + Duration::from_secs(5)
        );
    }
}
