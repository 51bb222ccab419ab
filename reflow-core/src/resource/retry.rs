//! Retry and Staleness Policies
//!
//! Both policies are supplied by the caller: the store itself has no
//! opinion about how long data stays fresh or how hard to retry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Exponential backoff schedule for retryable failures.
///
/// The delay before retry `n` (zero-based) is
/// `min(base_delay * 2^n, cap_delay)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. Zero disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            cap_delay: Duration::ZERO,
        }
    }

    /// The backoff delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map(|d| d.min(self.cap_delay))
            .unwrap_or(self.cap_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            cap_delay: Duration::from_secs(30),
        }
    }
}

/// Decides whether a cache entry's data is stale, given the instant it was
/// last committed.
#[derive(Clone)]
pub enum StalePolicy {
    /// Every subscribe revalidates. The default.
    Always,

    /// Committed data never goes stale; only an explicit refetch updates it.
    Never,

    /// Data is stale once it is older than the given age.
    MaxAge(Duration),

    /// Caller-supplied predicate over the commit timestamp.
    Custom(Arc<dyn Fn(Instant) -> bool + Send + Sync>),
}

impl StalePolicy {
    /// Whether data committed at `updated_at` is stale. Entries that never
    /// committed are always stale.
    pub fn is_stale(&self, updated_at: Option<Instant>) -> bool {
        let Some(at) = updated_at else {
            return true;
        };
        match self {
            StalePolicy::Always => true,
            StalePolicy::Never => false,
            StalePolicy::MaxAge(age) => at.elapsed() >= *age,
            StalePolicy::Custom(f) => f(at),
        }
    }
}

impl fmt::Debug for StalePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalePolicy::Always => write!(f, "Always"),
            StalePolicy::Never => write!(f, "Never"),
            StalePolicy::MaxAge(age) => f.debug_tuple("MaxAge").field(age).finish(),
            StalePolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            cap_delay: Duration::from_secs(30),
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 32,
            base_delay: Duration::from_millis(100),
            cap_delay: Duration::from_secs(1),
        };

        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_secs(1));
        assert_eq!(policy.backoff(20), Duration::from_secs(1));
        // Shift overflow saturates to the cap rather than wrapping.
        assert_eq!(policy.backoff(40), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn max_age_staleness() {
        let policy = StalePolicy::MaxAge(Duration::from_secs(60));
        let committed = Instant::now();

        assert!(!policy.is_stale(Some(committed)));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(policy.is_stale(Some(committed)));
    }

    #[test]
    fn missing_timestamp_is_always_stale() {
        assert!(StalePolicy::Never.is_stale(None));
        assert!(StalePolicy::Always.is_stale(None));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_policy_runs_the_predicate() {
        let policy = StalePolicy::Custom(Arc::new(|at: Instant| {
            at.elapsed() >= Duration::from_secs(5)
        }));
        let committed = Instant::now();

        assert!(!policy.is_stale(Some(committed)));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(policy.is_stale(Some(committed)));
    }
}
