//! Retry policy for transient provider failures.

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_str;

/// Exponential backoff with jitter, bounded by a total attempt count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per provider, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "duration_str")]
    pub min_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "duration_str")]
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub factor: f32,

    /// Randomize delays to spread out concurrent retries
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff schedule for `backon`.
    ///
    /// `backon` counts retries, not attempts, hence `max_attempts - 1`.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize);

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.min_delay < policy.max_delay);
    }

    #[test]
    fn test_backoff_yields_one_delay_per_retry() {
        let policy = RetryPolicy {
            max_attempts: 4,
            jitter: false,
            ..Default::default()
        };

        let delays: Vec<Duration> = policy.backoff().build().collect();
        assert_eq!(delays.len(), 3);
        assert_eq!(delays[0], Duration::from_millis(500));
        assert_eq!(delays[1], Duration::from_secs(1));
    }

    #[test]
    fn test_no_retry_has_no_delays() {
        assert_eq!(RetryPolicy::no_retry().backoff().build().count(), 0);
    }

    #[test]
    fn test_delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            max_delay: Duration::from_secs(2),
            jitter: false,
            ..Default::default()
        };

        assert!(policy.backoff().build().all(|d| d <= Duration::from_secs(2)));
    }
}
