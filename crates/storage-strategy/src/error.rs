use proven_resilience::Transient;
use thiserror::Error;

/// A blob store failure with the backend type erased.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct BlobFailure(pub Box<dyn std::error::Error + Send + Sync + 'static>);

impl Transient for BlobFailure {}

/// Errors that can occur while saving or loading buckets.
#[derive(Debug, Error)]
pub enum Error {
    /// Blob store call failed.
    #[error("blob storage failed: {0}")]
    Blob(#[from] proven_resilience::Error<BlobFailure>),

    /// Hash store call failed.
    #[error("hash storage failed: {0}")]
    Hash(#[from] proven_resilience::Error<proven_log_store::Error>),

    /// A location field references an object that no longer exists.
    #[error("object {path} referenced by {provider} is missing")]
    MissingObject {
        /// Provider that wrote the pointer.
        provider: String,
        /// Path of the missing object.
        path: String,
    },

    /// A location field could not be parsed.
    #[error("malformed location from {provider}: {reason}")]
    Pointer {
        /// Provider that wrote the pointer.
        provider: String,
        /// What was wrong with it.
        reason: String,
    },
}
