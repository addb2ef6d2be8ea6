//! Bounded retry for optimistic secret allocation.
//!
//! A claim that loses its race is not an error; the allocator simply picks another
//! candidate. The policy caps how often that may happen and spaces the attempts out with
//! exponential backoff plus jitter so that many buyers of the same SKU don't retry in
//! lockstep.

use std::time::Duration;

/// Retry policy for lost allocation races.
///
/// # Example
///
/// ```
/// use skufill_core::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .with_max_attempts(8)
///     .with_initial_delay(Duration::from_millis(2));
/// assert!(policy.should_retry(7));
/// assert!(!policy.should_retry(8));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    max_attempts: u32,

    /// Delay before the second attempt
    initial_delay: Duration,

    /// Upper bound for a single delay
    max_delay: Duration,

    /// Growth factor per attempt
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a retry policy with default settings
    ///
    /// Defaults:
    /// - `max_attempts`: 5
    /// - `initial_delay`: 5 milliseconds
    /// - `max_delay`: 200 milliseconds
    /// - `backoff_multiplier`: 2.0
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
        }
    }

    /// Policy that retries immediately, for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Set maximum attempts
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set delay before the first retry
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay between retries
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay after the given failed attempt (0-indexed).
    ///
    /// `min(initial_delay * multiplier^attempt, max_delay) * random(0.5..=1.0)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        #[allow(clippy::cast_possible_wrap)]
        let base_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());
        if capped_secs <= 0.0 {
            return Duration::ZERO;
        }

        let jitter = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::from_secs_f64(capped_secs * jitter)
    }

    /// Get maximum number of attempts
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether attempt number `attempt` (0-indexed) may still run.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_bounds_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 5);
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_millis(300));

        let first = policy.delay_for_attempt(0);
        assert!(first >= Duration::from_millis(50) && first <= Duration::from_millis(100));

        let second = policy.delay_for_attempt(1);
        assert!(second >= Duration::from_millis(100) && second <= Duration::from_millis(200));

        let capped = policy.delay_for_attempt(10);
        assert!(capped >= Duration::from_millis(150) && capped <= Duration::from_millis(300));
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::ZERO);
        assert!(!policy.should_retry(3));
    }
}
