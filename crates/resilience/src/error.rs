use thiserror::Error;

/// Classifies an error as worth retrying or not.
pub trait Transient {
    /// Whether a retry might succeed.
    fn is_transient(&self) -> bool {
        true
    }
}

/// Errors surfaced by [`crate::ResiliencePolicy::execute`].
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    /// The call was cancelled before it completed.
    #[error("{operation} cancelled")]
    Cancelled {
        /// Name of the guarded operation.
        operation: String,
    },

    /// The breaker is open and the call was not attempted.
    #[error("circuit open, {operation} rejected")]
    CircuitOpen {
        /// Name of the guarded operation.
        operation: String,
    },

    /// The last attempt failed and no retries remain, or the failure was permanent.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Name of the guarded operation.
        operation: String,
        /// Attempts made.
        attempts: usize,
        /// The last failure.
        #[source]
        source: E,
    },

    /// Every attempt timed out.
    #[error("{operation} timed out after {attempts} attempt(s)")]
    Timeout {
        /// Name of the guarded operation.
        operation: String,
        /// Attempts made.
        attempts: usize,
    },
}

impl<E> Error<E>
where
    E: std::error::Error + 'static,
{
    /// The underlying failure, if an attempt produced one.
    pub const fn inner(&self) -> Option<&E> {
        match self {
            Self::Exhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the call was abandoned because of cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
