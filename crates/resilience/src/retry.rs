use std::time::Duration;

/// How many times, and how patiently, a failed call is retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Defaults to 3.
    pub max_attempts: usize,

    /// Delay before the first retry. Defaults to 100ms.
    pub base_delay: Duration,

    /// Upper bound for the delay between retries. Defaults to 5 seconds.
    pub max_delay: Duration,

    /// Per-attempt timeout. Defaults to 10 seconds; `None` waits forever.
    pub operation_timeout: Option<Duration>,

    /// Whether to add up to 10% random jitter to each delay. Defaults to true.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            operation_timeout: Some(Duration::from_secs(10)),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// The delay to use after `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let factor = if self.jitter {
            fastrand::f64().mul_add(0.1, 2.0)
        } else {
            2.0
        };

        std::cmp::min(current.mul_f64(factor), self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter: false,
            ..RetryPolicy::default()
        };

        let first = policy.next_delay(policy.base_delay);
        let second = policy.next_delay(first);
        let third = policy.next_delay(second);

        assert_eq!(first, Duration::from_millis(200));
        assert_eq!(second, Duration::from_millis(350));
        assert_eq!(third, Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::default();

        for _ in 0..100 {
            let delay = policy.next_delay(Duration::from_millis(100));
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(210));
        }
    }
}
