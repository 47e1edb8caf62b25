//! Abstract interface for object storage used to offload payload segments.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for blob store errors.
pub trait BlobStoreError: Debug + Error + Send + Sync + 'static {}

/// A flat key/object store.
///
/// Keys are `/`-separated paths. Writes replace existing objects.
#[async_trait]
pub trait BlobStore: Clone + Debug + Send + Sync + 'static {
    /// Error type.
    type Error: BlobStoreError;

    /// Deletes an object. Deleting a missing object succeeds.
    async fn del(&self, key: &str) -> Result<(), Self::Error>;

    /// Reads an object.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Self::Error>;

    /// Writes an object.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), Self::Error>;
}
