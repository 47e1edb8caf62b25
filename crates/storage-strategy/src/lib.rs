//! Pluggable save/load of announcement buckets to stores other than the log.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod blob;
mod chain;
mod error;
mod hash;
mod lookup;

pub use blob::{BlobPointer, BlobStorageStrategy};
pub use chain::{KeyFilter, StrategyChain, StrategyRegistration};
pub use error::{BlobFailure, Error};
pub use hash::{HashStorageOptions, HashStorageStrategy};
pub use lookup::PropertyLookup;

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use proven_announcement::{Bucket, BucketCategory, Metadata};

/// Persists and retrieves the bucket of one category for one announcement.
///
/// Implementations must be safe for concurrent `save` and `load` calls.
#[async_trait]
pub trait StorageStrategy: Debug + Send + Sync {
    /// Identifier written into location field names. Must be unique within
    /// a chain.
    fn provider_id(&self) -> &str;

    /// Stores `bucket` and returns a pointer describing where it went.
    ///
    /// The pointer is embedded in the stream entry under
    /// `<provider_id>~<category>`. `None` means nothing needs recording.
    async fn save(
        &self,
        id: &str,
        bucket: &Bucket,
        category: BucketCategory,
        metadata: &Metadata,
    ) -> Result<Option<Bytes>, Error>;

    /// Retrieves the bucket stored for `category`, given the pointer this
    /// provider previously returned from `save`.
    async fn load(
        &self,
        metadata: &Metadata,
        category: BucketCategory,
        pointer: &Bytes,
    ) -> Result<Bucket, Error>;
}
