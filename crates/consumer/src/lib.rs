//! Consumer side of the announcement pipeline: reads a stream through a
//! consumer group, rehydrates payloads, dispatches to versioned handlers and
//! manages acknowledgment.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod ack;
mod backoff;
mod consumer;
mod error;
mod handler;
mod interceptor;
mod metrics;
mod pipeline;
mod plan;

pub use ack::{AckBehavior, AckHandle, AckState, Acknowledge, StreamAcknowledger};
pub use backoff::EmptyBackoff;
pub use consumer::Consumer;
pub use error::Error;
pub use handler::{
    AnnouncementHandler, Dispatch, FallbackContext, FallbackHandler, HandlerError,
    HandlerRegistry, RouteKey,
};
pub use interceptor::ConsumerInterceptor;
pub use pipeline::{ConsumerPipeline, PipelineState};
pub use plan::{ConsumerPlan, IterationOptions, StaleClaimOptions};
