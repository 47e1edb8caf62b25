use proven_log_store::EntryId;
use thiserror::Error;

type StoreFailure = proven_resilience::Error<proven_log_store::Error>;

/// Errors that can occur while consuming announcements.
#[derive(Debug, Error)]
pub enum Error {
    /// The store acknowledgment primitive failed.
    #[error("failed to acknowledge {id}: {source}")]
    Ack {
        /// Entry being acknowledged.
        id: EntryId,
        /// The policy failure.
        #[source]
        source: StoreFailure,
    },

    /// `start` was called on a consumer that already started.
    #[error("consumer already started")]
    AlreadyStarted,

    /// An entry could not be decoded.
    #[error(transparent)]
    Decode(#[from] proven_announcement::Error),

    /// Reading the stream failed.
    #[error("failed to read {stream}: {source}")]
    Read {
        /// Stream key.
        stream: String,
        /// The policy failure.
        #[source]
        source: StoreFailure,
    },

    /// Rehydrating a bucket failed.
    #[error(transparent)]
    Storage(#[from] proven_storage_strategy::Error),
}
