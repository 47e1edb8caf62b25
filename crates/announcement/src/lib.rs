//! Data model shared by producers and consumers: the announcement envelope,
//! its metadata, and the segmented payload buckets.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod announcement;
mod bucket;
mod category;
mod error;
mod metadata;
mod origin;

/// Names of the fields written into a stream entry.
pub mod wire;

pub use announcement::Announcement;
pub use bucket::Bucket;
pub use category::{BucketCategory, EventBucketCategories};
pub use error::Error;
pub use metadata::{DEFAULT_CHANNEL_TYPE, Metadata, full_uri};
pub use origin::MessageOrigin;
