//! A stream entry is a flat list of `(field, bytes)` pairs. The metadata is
//! projected into a few named fields for cheap inspection by tooling, and the
//! full record is carried in a reserved slot.

use bytes::Bytes;
use chrono::DateTime;

use crate::category::{BucketCategory, EventBucketCategories};
use crate::error::Error;
use crate::metadata::Metadata;
use crate::origin::MessageOrigin;

/// Message id field.
pub const MESSAGE_ID: &str = "MessageId";

/// Operation name field.
pub const OPERATION: &str = "Operation";

/// Production time field, unix seconds.
pub const PRODUCED_AT: &str = "ProducedAt";

/// Transport tag field.
pub const CHANNEL_TYPE: &str = "ChannelType";

/// Origin bits field.
pub const ORIGIN: &str = "Origin";

/// Reserved slot holding the serialized metadata.
pub const METADATA: &str = "__metadata";

/// Separates provider id and category in location field names.
pub const LOCATION_SEPARATOR: char = '~';

/// Name of the field a storage provider uses to record where it put a bucket.
#[must_use]
pub fn location_field(provider_id: &str, category: BucketCategory) -> String {
    format!("{provider_id}{LOCATION_SEPARATOR}{category}")
}

/// Projects metadata into entry fields.
///
/// # Errors
///
/// Returns an error if the metadata cannot be serialized.
pub fn encode_metadata(metadata: &Metadata) -> Result<Vec<(String, Bytes)>, Error> {
    let serialized = serde_json::to_vec(metadata).map_err(Error::Serialize)?;

    Ok(vec![
        (MESSAGE_ID.to_string(), Bytes::from(metadata.message_id().to_string())),
        (OPERATION.to_string(), Bytes::from(metadata.operation().to_string())),
        (
            PRODUCED_AT.to_string(),
            Bytes::from(metadata.produced_at().timestamp().to_string()),
        ),
        (
            CHANNEL_TYPE.to_string(),
            Bytes::from(metadata.channel_type().to_string()),
        ),
        (
            ORIGIN.to_string(),
            Bytes::from(metadata.origin().bits().to_string()),
        ),
        (METADATA.to_string(), Bytes::from(serialized)),
    ])
}

/// Rebuilds metadata from entry fields.
///
/// The reserved slot is authoritative. Entries written without it are
/// rebuilt from the named fields, in which case every bucket category is
/// assumed present.
///
/// # Errors
///
/// Returns an error if the reserved slot is malformed or, without it, a named
/// field is missing or malformed.
pub fn decode_metadata(fields: &[(String, Bytes)]) -> Result<Metadata, Error> {
    if let Some(slot) = field(fields, METADATA) {
        return serde_json::from_slice(slot).map_err(Error::Deserialize);
    }

    let message_id = text(fields, MESSAGE_ID)?;
    let operation = text(fields, OPERATION)?;
    let mut metadata = Metadata::new(operation, 0)
        .with_message_id(message_id)
        .with_storage_types(EventBucketCategories::ALL);

    if let Some(raw) = optional_text(fields, PRODUCED_AT)? {
        let produced_at = raw
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(Error::InvalidField {
                field: PRODUCED_AT,
                value: raw,
            })?;
        metadata = metadata.with_produced_at(produced_at);
    }

    if let Some(channel_type) = optional_text(fields, CHANNEL_TYPE)? {
        metadata = metadata.with_channel_type(channel_type);
    }

    if let Some(raw) = optional_text(fields, ORIGIN)? {
        let bits = raw.parse::<u8>().map_err(|_| Error::InvalidField {
            field: ORIGIN,
            value: raw.clone(),
        })?;
        metadata = metadata.with_origin(MessageOrigin::from_bits_truncate(bits));
    }

    Ok(metadata)
}

fn field<'a>(fields: &'a [(String, Bytes)], name: &str) -> Option<&'a Bytes> {
    fields
        .iter()
        .find(|(field, _)| field == name)
        .map(|(_, value)| value)
}

fn optional_text(fields: &[(String, Bytes)], name: &'static str) -> Result<Option<String>, Error> {
    field(fields, name)
        .map(|value| {
            String::from_utf8(value.to_vec()).map_err(|e| Error::InvalidField {
                field: name,
                value: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            })
        })
        .transpose()
}

fn text(fields: &[(String, Bytes)], name: &'static str) -> Result<String, Error> {
    optional_text(fields, name)?.ok_or(Error::MissingField(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_reserved_slot_is_authoritative() {
        let metadata = Metadata::new("Execute", 2)
            .with_params_signature("a,b")
            .with_environment("dev")
            .with_uri("jobs")
            .with_storage_types(EventBucketCategories::SEGMENTS);

        let fields = encode_metadata(&metadata).unwrap();
        let decoded = decode_metadata(&fields).unwrap();

        assert_eq!(decoded, metadata);
    }

    #[test]
    fn test_named_fields_fallback() {
        let fields = vec![
            (MESSAGE_ID.to_string(), Bytes::from("m-1")),
            (OPERATION.to_string(), Bytes::from("Hello")),
            (PRODUCED_AT.to_string(), Bytes::from("1700000000")),
            (ORIGIN.to_string(), Bytes::from("2")),
        ];

        let decoded = decode_metadata(&fields).unwrap();

        assert_eq!(decoded.message_id(), "m-1");
        assert_eq!(decoded.operation(), "Hello");
        assert_eq!(decoded.produced_at().timestamp(), 1_700_000_000);
        assert!(decoded.origin().is_copy());
        assert_eq!(decoded.storage_types(), EventBucketCategories::ALL);
    }

    #[test]
    fn test_missing_operation() {
        let fields = vec![(MESSAGE_ID.to_string(), Bytes::from("m-1"))];

        assert_matches!(decode_metadata(&fields), Err(Error::MissingField(OPERATION)));
    }

    #[test]
    fn test_location_field() {
        assert_eq!(
            location_field("blob", BucketCategory::Segments),
            "blob~Segments"
        );
    }
}
