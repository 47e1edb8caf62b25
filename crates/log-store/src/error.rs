use proven_resilience::Transient;
use thiserror::Error;

/// Errors that can occur against a log store.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// The connection was closed.
    #[error("connection closed")]
    Closed,

    /// Could not reach the store.
    #[error("connection error: {0}")]
    Connection(String),

    /// The supervisor has been disposed.
    #[error("connection supervisor disposed")]
    Disposed,

    /// The consumer group does not exist on the stream.
    #[error("consumer group {group} not found on {stream}")]
    GroupNotFound {
        /// Stream key.
        stream: String,
        /// Group name.
        group: String,
    },

    /// Waiting for the reconnect lock timed out.
    #[error("timed out waiting for the reconnect lock")]
    LockTimeout,

    /// The stream does not exist yet.
    #[error("stream {0} not found")]
    StreamNotFound(String),
}

impl Transient for Error {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Backend(_) | Self::Closed | Self::Connection(_) | Self::LockTimeout
        )
    }
}
