use proven_blob_store::BlobStoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A failure requested through [`crate::MemoryBlobStore::fail_next_writes`].
    #[error("injected write failure for {0}")]
    Injected(String),
}

impl BlobStoreError for Error {}
