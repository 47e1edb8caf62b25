//! Retry and circuit-breaker policy applied around remote calls.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod breaker;
mod error;
mod policy;
mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{Error, Transient};
pub use policy::ResiliencePolicy;
pub use retry::RetryPolicy;
