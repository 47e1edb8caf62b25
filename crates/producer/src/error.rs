use thiserror::Error;

/// Errors that can occur while producing announcements.
#[derive(Debug, Error)]
pub enum Error {
    /// Appending to the stream failed after the resilience policy gave up.
    #[error("failed to append to {stream}: {source}")]
    Append {
        /// Target stream key.
        stream: String,
        /// The policy failure.
        #[source]
        source: proven_resilience::Error<proven_log_store::Error>,
    },

    /// The announcement could not be encoded.
    #[error(transparent)]
    Encode(#[from] proven_announcement::Error),

    /// The announcement is already a copy and will not be forwarded again.
    #[error("announcement {message_id} is already a copy")]
    ForwardLoop {
        /// Id of the rejected announcement.
        message_id: String,
    },

    /// Offloading a bucket failed.
    #[error(transparent)]
    Storage(#[from] proven_storage_strategy::Error),
}
