use std::time::Duration;

/// Exponential delay applied between reads that return nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmptyBackoff {
    /// First delay, and the delay after a reset. Defaults to 10ms.
    pub initial: Duration,

    /// Upper bound. Defaults to 5 seconds.
    pub max: Duration,

    current: Duration,
}

impl Default for EmptyBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(10), Duration::from_secs(5))
    }
}

impl EmptyBackoff {
    /// Creates a backoff starting at `initial` and doubling up to `max`.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to apply now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay.
    pub const fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_monotonically_to_cap() {
        let mut backoff = EmptyBackoff::new(Duration::from_millis(10), Duration::from_millis(100));

        let delays: Vec<_> = (0..8).map(|_| backoff.next_delay()).collect();

        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(delays[0], Duration::from_millis(10));
        assert_eq!(delays[1], Duration::from_millis(20));
        assert_eq!(delays[7], Duration::from_millis(100));
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut backoff = EmptyBackoff::default();
        for _ in 0..20 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));

        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }
}
