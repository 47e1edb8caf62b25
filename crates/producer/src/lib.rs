//! Producer side of the announcement pipeline: builds announcements from
//! calls, offloads their payload through the storage chain and appends them
//! to the stream under the resilience policy.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod interceptor;
mod metrics;
mod plan;
mod producer;
mod segmentation;

pub use error::Error;
pub use interceptor::ProducerInterceptor;
pub use plan::{Invocation, ProducerPlan};
pub use producer::Producer;
pub use segmentation::{JsonFieldSegmentation, SegmentationStrategy};
