use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::EventBucketCategories;
use crate::origin::MessageOrigin;

/// Transport tag written when a producer does not set one.
pub const DEFAULT_CHANNEL_TYPE: &str = "log-stream";

/// Joins an environment and a uri into the stream key.
///
/// An empty environment yields the bare uri.
#[must_use]
pub fn full_uri(environment: &str, uri: &str) -> String {
    if environment.is_empty() {
        uri.to_string()
    } else {
        format!("{environment}:{uri}")
    }
}

/// Immutable description of a single announcement.
///
/// `message_id`, `uri`, and `environment` together identify a delivery
/// attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    message_id: String,
    event_key: Option<String>,
    produced_at: DateTime<Utc>,
    operation: String,
    version: u32,
    params_signature: String,
    environment: String,
    uri: String,
    origin: MessageOrigin,
    channel_type: String,
    storage_types: EventBucketCategories,
}

impl Metadata {
    /// Creates metadata for a fresh announcement of `operation` at `version`
    /// with a random message id produced now.
    #[must_use]
    pub fn new<O: Into<String>>(operation: O, version: u32) -> Self {
        Self {
            message_id: Uuid::new_v4().simple().to_string(),
            event_key: None,
            produced_at: Utc::now(),
            operation: operation.into(),
            version,
            params_signature: String::new(),
            environment: String::new(),
            uri: String::new(),
            origin: MessageOrigin::ORIGINAL,
            channel_type: DEFAULT_CHANNEL_TYPE.to_string(),
            storage_types: EventBucketCategories::empty(),
        }
    }

    /// Opaque unique id.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Position token assigned by the log store, once appended.
    #[must_use]
    pub fn event_key(&self) -> Option<&str> {
        self.event_key.as_deref()
    }

    /// When the producer built the announcement.
    #[must_use]
    pub const fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    /// Name of the invoked capability.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Version of the invoked capability.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Fingerprint of the parameter shape.
    #[must_use]
    pub fn params_signature(&self) -> &str {
        &self.params_signature
    }

    /// Logical namespace.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Stream identity within the environment.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The stream key: `environment:uri`.
    #[must_use]
    pub fn full_uri(&self) -> String {
        full_uri(&self.environment, &self.uri)
    }

    /// Original or forwarded.
    #[must_use]
    pub const fn origin(&self) -> MessageOrigin {
        self.origin
    }

    /// Transport tag.
    #[must_use]
    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    /// Which buckets carry data.
    #[must_use]
    pub const fn storage_types(&self) -> EventBucketCategories {
        self.storage_types
    }

    /// Replaces the message id.
    #[must_use]
    pub fn with_message_id<S: Into<String>>(mut self, message_id: S) -> Self {
        self.message_id = message_id.into();
        self
    }

    /// Sets the store-assigned position token.
    #[must_use]
    pub fn with_event_key<S: Into<String>>(mut self, event_key: S) -> Self {
        self.event_key = Some(event_key.into());
        self
    }

    /// Replaces the production time.
    #[must_use]
    pub const fn with_produced_at(mut self, produced_at: DateTime<Utc>) -> Self {
        self.produced_at = produced_at;
        self
    }

    /// Sets the parameter fingerprint.
    #[must_use]
    pub fn with_params_signature<S: Into<String>>(mut self, params_signature: S) -> Self {
        self.params_signature = params_signature.into();
        self
    }

    /// Moves the announcement to another environment.
    #[must_use]
    pub fn with_environment<S: Into<String>>(mut self, environment: S) -> Self {
        self.environment = environment.into();
        self
    }

    /// Moves the announcement to another uri.
    #[must_use]
    pub fn with_uri<S: Into<String>>(mut self, uri: S) -> Self {
        self.uri = uri.into();
        self
    }

    /// Sets the origin flags.
    #[must_use]
    pub const fn with_origin(mut self, origin: MessageOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the transport tag.
    #[must_use]
    pub fn with_channel_type<S: Into<String>>(mut self, channel_type: S) -> Self {
        self.channel_type = channel_type.into();
        self
    }

    /// Records which buckets carry data.
    #[must_use]
    pub const fn with_storage_types(mut self, storage_types: EventBucketCategories) -> Self {
        self.storage_types = storage_types;
        self
    }

    /// Re-labels the announcement as another `(operation, version, signature)`.
    #[must_use]
    pub fn with_route<O, S>(mut self, operation: O, version: u32, params_signature: S) -> Self
    where
        O: Into<String>,
        S: Into<String>,
    {
        self.operation = operation.into();
        self.version = version;
        self.params_signature = params_signature.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_uri() {
        let meta = Metadata::new("Hello", 0)
            .with_environment("prod")
            .with_uri("orders");

        assert_eq!(meta.full_uri(), "prod:orders");
        assert_eq!(full_uri("", "orders"), "orders");
    }

    #[test]
    fn test_fresh_ids_differ() {
        let a = Metadata::new("Hello", 0);
        let b = Metadata::new("Hello", 0);

        assert_ne!(a.message_id(), b.message_id());
        assert_eq!(a.origin(), MessageOrigin::ORIGINAL);
        assert!(a.event_key().is_none());
    }
}
