//! Three-state circuit breaker.
//!
//! ```text
//! Closed --(failures >= threshold)--> Open --(timeout)--> HalfOpen
//!    ^                                  ^                    |
//!    |                                  +----(any failure)---+
//!    +-----------(successes >= threshold)--------------------+
//! ```
//!
//! State checks are a single atomic load. The open timestamp uses the tokio
//! clock so paused-time tests can drive the timeout.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through.
    Closed,

    /// Calls are rejected until the timeout elapses.
    Open,

    /// Calls pass through to probe recovery.
    HalfOpen,
}

impl CircuitState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

/// Configuration for [`CircuitBreaker`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit. Defaults to 5.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit. Defaults to 2.
    pub success_threshold: u32,

    /// Time spent open before probing. Defaults to 30 seconds.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Fails fast once a dependency keeps failing.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failure_count: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    state: AtomicU8,
    success_count: AtomicU32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failure_count: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            state: AtomicU8::new(0),
            success_count: AtomicU32::new(0),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a call may proceed. An open breaker whose timeout has elapsed
    /// moves to half-open and admits the call.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if self.remaining_open().is_none() {
                    self.transition(CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// How long the breaker stays open, or `None` if calls may proceed.
    #[must_use]
    pub fn remaining_open(&self) -> Option<Duration> {
        if self.state() != CircuitState::Open {
            return None;
        }

        let opened_at = (*self.opened_at.lock())?;
        let elapsed = opened_at.elapsed();

        self.config
            .timeout
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    /// Records a successful call.
    pub fn report_success(&self) {
        match self.state() {
            CircuitState::Closed => self.failure_count.store(0, Ordering::Release),
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition(CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn report_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    fn transition(&self, to: CircuitState) {
        // The open timestamp must be visible before the state flips to open.
        if to == CircuitState::Open {
            *self.opened_at.lock() = Some(Instant::now());
        }

        let from = CircuitState::from_u8(self.state.swap(to.as_u8(), Ordering::AcqRel));
        self.failure_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);

        match to {
            CircuitState::Open => {
                warn!(?from, timeout = ?self.config.timeout, "circuit breaker opened");
            }
            CircuitState::HalfOpen => info!(?from, "circuit breaker half-open"),
            CircuitState::Closed => info!(?from, "circuit breaker closed"),
        }
    }
}
