use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use proven_announcement::{Bucket, BucketCategory, Metadata};
use proven_log_store::{ConnectionSupervisor, Connector, LogConnection};
use proven_resilience::ResiliencePolicy;

use crate::StorageStrategy;
use crate::error::Error;

/// Options for [`HashStorageStrategy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashStorageOptions {
    /// Provider id used in location fields. Defaults to `hash`.
    pub provider_id: String,

    /// Expiry of stored hashes. Defaults to none.
    pub ttl: Option<Duration>,
}

impl Default for HashStorageOptions {
    fn default() -> Self {
        Self {
            provider_id: "hash".to_string(),
            ttl: None,
        }
    }
}

/// Stores each bucket as a hash in the log store itself, keyed
/// `{fullUri}:{category}:{messageId}`.
#[derive(Debug)]
pub struct HashStorageStrategy<C>
where
    C: Connector,
{
    options: HashStorageOptions,
    policy: ResiliencePolicy,
    supervisor: Arc<ConnectionSupervisor<C>>,
}

impl<C> HashStorageStrategy<C>
where
    C: Connector,
{
    /// Creates a strategy writing through `supervisor`.
    pub const fn new(
        supervisor: Arc<ConnectionSupervisor<C>>,
        policy: ResiliencePolicy,
        options: HashStorageOptions,
    ) -> Self {
        Self {
            options,
            policy,
            supervisor,
        }
    }

    /// Hash key for one bucket.
    #[must_use]
    pub fn hash_key(metadata: &Metadata, category: BucketCategory, id: &str) -> String {
        format!("{}:{category}:{id}", metadata.full_uri())
    }
}

#[async_trait]
impl<C> StorageStrategy for HashStorageStrategy<C>
where
    C: Connector,
{
    fn provider_id(&self) -> &str {
        &self.options.provider_id
    }

    async fn save(
        &self,
        id: &str,
        bucket: &Bucket,
        category: BucketCategory,
        metadata: &Metadata,
    ) -> Result<Option<Bytes>, Error> {
        let key = Self::hash_key(metadata, category, id);
        let fields: Vec<(String, Bytes)> = bucket
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        self.policy
            .execute("hash_set", || async {
                self.supervisor
                    .acquire()
                    .await?
                    .hash_set(&key, fields.clone(), self.options.ttl)
                    .await
            })
            .await?;

        Ok(Some(Bytes::from(key)))
    }

    async fn load(
        &self,
        _metadata: &Metadata,
        _category: BucketCategory,
        pointer: &Bytes,
    ) -> Result<Bucket, Error> {
        let key = std::str::from_utf8(pointer).map_err(|e| Error::Pointer {
            provider: self.options.provider_id.clone(),
            reason: e.to_string(),
        })?;

        let fields = self
            .policy
            .execute("hash_get_all", || async {
                self.supervisor.acquire().await?.hash_get_all(key).await
            })
            .await?;

        Ok(fields.into_iter().collect())
    }
}
