use thiserror::Error;

/// Errors raised while projecting metadata to and from stream fields.
#[derive(Debug, Error)]
pub enum Error {
    /// The reserved metadata slot could not be decoded.
    #[error("failed to decode metadata: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// A named field held a value of the wrong shape.
    #[error("invalid value for field {field}: {value}")]
    InvalidField {
        /// The offending field.
        field: &'static str,
        /// The raw value.
        value: String,
    },

    /// A required field was absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Metadata could not be encoded into the reserved slot.
    #[error("failed to encode metadata: {0}")]
    Serialize(#[source] serde_json::Error),
}
