//! Retry policies for part transfers.
//!
//! Two levels of retry exist:
//!
//! - [`LocalRetryPolicy`]: immediate, bounded retries inside a worker for
//!   transient network errors (timeouts, resets, 5xx).
//! - [`RetryBudget`]: the transfer-wide bound on how many times the engine
//!   may re-queue a part after a worker gives up.

use std::time::Duration;

/// Default initial delay for exponential backoff (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default maximum delay for exponential backoff (5 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 5;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default number of attempts a worker makes before escalating.
pub const DEFAULT_LOCAL_ATTEMPTS: u32 = 3;

/// Default transfer-wide retry budget.
pub const DEFAULT_RETRY_NUMBER: u64 = 10;

/// How many re-queues the engine may perform across a whole transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryBudget {
    /// At most this many re-queues.
    Bounded(u64),
    /// Never abort purely because of the number of retries.
    Unlimited,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::Bounded(DEFAULT_RETRY_NUMBER)
    }
}

impl RetryBudget {
    /// Interprets a configured retry number, where negative means unlimited.
    pub fn from_retry_number(retry_number: i64) -> Self {
        u64::try_from(retry_number)
            .map(Self::Bounded)
            .unwrap_or(Self::Unlimited)
    }

    /// Returns true if another re-queue is allowed after `used` re-queues.
    pub fn allows(&self, used: u64) -> bool {
        match self {
            Self::Bounded(max) => used < *max,
            Self::Unlimited => true,
        }
    }
}

impl std::fmt::Display for RetryBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{}", n),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// How a worker retries transient failures before escalating to the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum LocalRetryPolicy {
    /// No retries - escalate immediately on error.
    None,

    /// Fixed number of attempts with constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between retry attempts.
        delay: Duration,
    },

    /// Exponential backoff.
    ///
    /// The delay grows by `multiplier` after each failed attempt, capped at
    /// `max_delay`.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Initial delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
        /// Multiplier applied to delay after each failure.
        multiplier: f64,
    },
}

impl Default for LocalRetryPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_LOCAL_ATTEMPTS)
    }
}

impl LocalRetryPolicy {
    /// Exponential backoff with the default 100ms initial delay, 5s cap and
    /// multiplier 2.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Fixed delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Calculates the delay before retry number `attempt` (1-based, where 1
    /// is the first retry), or `None` if no more attempts are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = initial_delay.as_millis() as f64 * factor;
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    /// Maximum number of attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => (*max_attempts).max(1),
            Self::ExponentialBackoff { max_attempts, .. } => (*max_attempts).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_retry_number_is_unlimited() {
        assert_eq!(RetryBudget::from_retry_number(-1), RetryBudget::Unlimited);
        assert_eq!(RetryBudget::from_retry_number(i64::MIN), RetryBudget::Unlimited);
        assert_eq!(RetryBudget::from_retry_number(0), RetryBudget::Bounded(0));
        assert_eq!(RetryBudget::from_retry_number(5), RetryBudget::Bounded(5));
    }

    #[test]
    fn test_bounded_budget() {
        let budget = RetryBudget::Bounded(2);
        assert!(budget.allows(0));
        assert!(budget.allows(1));
        assert!(!budget.allows(2));
    }

    #[test]
    fn test_unlimited_budget() {
        assert!(RetryBudget::Unlimited.allows(u64::MAX));
    }

    #[test]
    fn test_default_budget() {
        assert_eq!(RetryBudget::default(), RetryBudget::Bounded(DEFAULT_RETRY_NUMBER));
    }

    #[test]
    fn test_none_policy() {
        let policy = LocalRetryPolicy::None;
        assert_eq!(policy.max_attempts(), 1);
        assert!(policy.delay_for_attempt(1).is_none());
    }

    #[test]
    fn test_fixed_policy() {
        let policy = LocalRetryPolicy::fixed(3, Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(50)));
        assert!(policy.delay_for_attempt(3).is_none());
    }

    #[test]
    fn test_exponential_policy() {
        let policy = LocalRetryPolicy::exponential(5);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(400)));
        assert!(policy.delay_for_attempt(5).is_none());
    }

    #[test]
    fn test_exponential_policy_capped() {
        let policy = LocalRetryPolicy::ExponentialBackoff {
            max_attempts: 20,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            multiplier: 10.0,
        };
        assert_eq!(policy.delay_for_attempt(4), Some(Duration::from_secs(3)));
    }
}
