//! Bounded linear backoff for retried requests.

use std::time::Duration;

/// Linear retry schedule: the delay after the n-th failure (0-based) is
/// `n * step`, and the schedule is exhausted once `max_attempts` attempts
/// have failed.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    failures: u32,
    max_attempts: u32,
    step: Duration,
}

impl LinearBackoff {
    #[must_use]
    pub const fn new(max_attempts: u32, step: Duration) -> Self {
        Self {
            failures: 0,
            max_attempts,
            step,
        }
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` when no
    /// attempts remain.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.step.saturating_mul(self.failures);
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.max_attempts {
            None
        } else {
            Some(delay)
        }
    }

    /// Number of attempts that have failed so far.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_linearly_from_zero() {
        let mut backoff = LinearBackoff::new(10, Duration::from_millis(5000));

        assert_eq!(backoff.next_delay(), Some(Duration::ZERO));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(5000)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10000)));
    }

    #[test]
    fn test_exhausted_after_max_attempts() {
        let mut backoff = LinearBackoff::new(10, Duration::from_millis(5000));

        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();

        // Ten attempts in total means nine waits between them
        assert_eq!(delays.len(), 9);
        assert_eq!(backoff.failures(), 10);
        assert_eq!(delays.last(), Some(&Duration::from_millis(40000)));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_single_attempt_never_waits() {
        let mut backoff = LinearBackoff::new(1, Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), None);
    }
}
