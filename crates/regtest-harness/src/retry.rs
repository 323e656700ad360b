//! Bounded polling and the outer run deadline.
//!
//! Every wait in the harness goes through [`RetryPolicy::poll`]: daemon
//! readiness, peering, height confirmation and indexer sync. A probe decides
//! per attempt whether the awaited condition holds, should be retried, or has
//! failed outright.

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Outcome of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T, E> {
    /// The awaited condition holds.
    Ready(T),
    /// Not yet; try again after the interval.
    Retry(E),
    /// A failure that retrying cannot fix.
    Fail(E),
}

/// Why a poll loop ended without success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// The attempt budget ran out; `last` is the final retryable failure.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Failure reported by the final attempt.
        last: E,
    },
    /// A probe reported a non-retryable failure.
    #[error("{0}")]
    Fatal(E),
}

/// Spacing and attempt budget for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy; a zero attempt budget is raised to one.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
        }
    }

    /// Delay between consecutive attempts.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Shrinks the attempt budget so the loop's total sleeping fits in
    /// `remaining`. At least one attempt is always kept.
    #[must_use]
    pub fn within(self, remaining: Duration) -> Self {
        let Some(sleeps) = remaining.as_millis().checked_div(self.interval.as_millis()) else {
            return self;
        };
        let affordable = u32::try_from(sleeps)
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        Self::new(self.interval, self.max_attempts.min(affordable))
    }

    /// Runs `probe` until it is ready, fails, or the budget is spent,
    /// sleeping [`interval`](Self::interval) between attempts.
    ///
    /// The probe receives the one-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Fatal`] on the first [`Probe::Fail`] and
    /// [`RetryError::Exhausted`] once every attempt returned
    /// [`Probe::Retry`].
    pub fn poll<T, E>(&self, probe: impl FnMut(u32) -> Probe<T, E>) -> Result<T, RetryError<E>> {
        self.poll_with(probe, thread::sleep)
    }

    /// [`poll`](Self::poll) with an injectable sleep.
    ///
    /// # Errors
    ///
    /// See [`poll`](Self::poll).
    pub fn poll_with<T, E>(
        &self,
        mut probe: impl FnMut(u32) -> Probe<T, E>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, RetryError<E>> {
        let mut attempt = 1;
        loop {
            match probe(attempt) {
                Probe::Ready(value) => return Ok(value),
                Probe::Fail(error) => return Err(RetryError::Fatal(error)),
                Probe::Retry(error) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                Probe::Retry(_) => {
                    sleep(self.interval);
                    attempt += 1;
                }
            }
        }
    }
}

/// Outer bound on a whole harness run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Starts a deadline `limit` from now.
    #[must_use]
    pub fn starting_now(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Time left before the deadline; zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    /// The configured limit.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rstest::rstest;

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1000), max_attempts)
    }

    #[rstest]
    fn zero_attempts_is_raised_to_one() {
        assert_eq!(policy(0).max_attempts(), 1);
    }

    #[rstest]
    fn succeeds_on_first_ready_without_sleeping() {
        let sleeps = Cell::new(0);
        let outcome: Result<u32, RetryError<&str>> =
            policy(5).poll_with(Probe::Ready, |_| sleeps.set(sleeps.get() + 1));

        assert_eq!(outcome, Ok(1));
        assert_eq!(sleeps.get(), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(10)]
    fn exhausts_after_exactly_max_attempts(#[case] max_attempts: u32) {
        let probes = Cell::new(0);
        let sleeps = Cell::new(0);
        let outcome: Result<(), RetryError<&str>> = policy(max_attempts).poll_with(
            |_| {
                probes.set(probes.get() + 1);
                Probe::Retry("not yet")
            },
            |_| sleeps.set(sleeps.get() + 1),
        );

        assert_eq!(
            outcome,
            Err(RetryError::Exhausted {
                attempts: max_attempts,
                last: "not yet"
            })
        );
        assert_eq!(probes.get(), max_attempts);
        assert_eq!(sleeps.get(), max_attempts - 1);
    }

    #[rstest]
    fn fatal_probe_stops_immediately() {
        let probes = Cell::new(0);
        let outcome: Result<(), RetryError<&str>> = policy(10).poll_with(
            |_| {
                probes.set(probes.get() + 1);
                Probe::Fail("rejected")
            },
            |_| {},
        );

        assert_eq!(outcome, Err(RetryError::Fatal("rejected")));
        assert_eq!(probes.get(), 1);
    }

    #[rstest]
    fn sleeps_the_configured_interval() {
        let mut slept = Vec::new();
        let outcome: Result<u32, RetryError<()>> = policy(5).poll_with(
            |attempt| {
                if attempt == 3 {
                    Probe::Ready(attempt)
                } else {
                    Probe::Retry(())
                }
            },
            |interval| slept.push(interval),
        );

        assert_eq!(outcome, Ok(3));
        assert_eq!(slept, vec![Duration::from_millis(1000); 2]);
    }

    #[rstest]
    #[case(Duration::from_millis(4500), 5)]
    #[case(Duration::from_millis(999), 1)]
    #[case(Duration::ZERO, 1)]
    #[case(Duration::from_secs(3600), 100)]
    fn within_caps_attempts_to_remaining_time(
        #[case] remaining: Duration,
        #[case] expected: u32,
    ) {
        assert_eq!(policy(100).within(remaining).max_attempts(), expected);
    }

    #[rstest]
    fn within_ignores_zero_interval() {
        let policy = RetryPolicy::new(Duration::ZERO, 7);
        assert_eq!(policy.within(Duration::ZERO), policy);
    }

    #[rstest]
    fn deadline_reports_expiry() {
        let expired = Deadline::starting_now(Duration::ZERO);
        let open = Deadline::starting_now(Duration::from_secs(3600));

        assert!(expired.is_expired());
        assert_eq!(expired.remaining(), Duration::ZERO);
        assert!(!open.is_expired());
        assert!(open.remaining() > Duration::from_secs(3500));
    }
}
