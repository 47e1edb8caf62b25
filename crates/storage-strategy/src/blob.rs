use async_trait::async_trait;
use bytes::Bytes;
use proven_announcement::{Bucket, BucketCategory, Metadata};
use proven_blob_store::BlobStore;
use proven_resilience::ResiliencePolicy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::StorageStrategy;
use crate::error::{BlobFailure, Error};

/// Where one bucket key was written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobPointer {
    /// Bucket key.
    pub key: String,

    /// Object path in the blob store.
    pub external_path: String,
}

/// Stores each bucket key as its own object at
/// `{environment}/{uri}/{yyyy-mm-dd}/{operation}/{messageId}/{provider}/{category}/{index}`.
///
/// The location field holds a JSON array of [`BlobPointer`]s.
#[derive(Debug)]
pub struct BlobStorageStrategy<B>
where
    B: BlobStore,
{
    policy: ResiliencePolicy,
    provider_id: String,
    store: B,
}

impl<B> BlobStorageStrategy<B>
where
    B: BlobStore,
{
    /// Creates a strategy writing to `store`.
    pub fn new<S: Into<String>>(provider_id: S, store: B, policy: ResiliencePolicy) -> Self {
        Self {
            policy,
            provider_id: provider_id.into(),
            store,
        }
    }

    /// Object path for the `index`th key of one bucket of an announcement.
    #[must_use]
    pub fn object_path(
        &self,
        metadata: &Metadata,
        id: &str,
        category: BucketCategory,
        index: usize,
    ) -> String {
        let date = metadata.produced_at().format("%Y-%m-%d").to_string();
        let index = index.to_string();

        [
            metadata.environment(),
            metadata.uri(),
            date.as_str(),
            metadata.operation(),
            id,
            self.provider_id.as_str(),
            category.as_str(),
            index.as_str(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
    }

    /// Removes objects written by a save that did not complete.
    async fn discard(&self, pointers: &[BlobPointer]) {
        for pointer in pointers {
            if let Err(e) = self.store.del(&pointer.external_path).await {
                warn!(
                    provider = %self.provider_id,
                    path = %pointer.external_path,
                    error = %e,
                    "failed to discard partially saved object"
                );
            }
        }
    }

    fn pointer_error(&self, reason: String) -> Error {
        Error::Pointer {
            provider: self.provider_id.clone(),
            reason,
        }
    }
}

fn blob_failure<E: std::error::Error + Send + Sync + 'static>(error: E) -> BlobFailure {
    BlobFailure(Box::new(error))
}

#[async_trait]
impl<B> StorageStrategy for BlobStorageStrategy<B>
where
    B: BlobStore,
{
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn save(
        &self,
        id: &str,
        bucket: &Bucket,
        category: BucketCategory,
        metadata: &Metadata,
    ) -> Result<Option<Bytes>, Error> {
        let mut pointers = Vec::with_capacity(bucket.len());

        for (index, (key, value)) in bucket.iter().enumerate() {
            let path = self.object_path(metadata, id, category, index);

            let written = self
                .policy
                .execute("blob_put", || async {
                    self.store
                        .put(&path, value.clone())
                        .await
                        .map_err(blob_failure)
                })
                .await;

            if let Err(e) = written {
                self.discard(&pointers).await;
                return Err(e.into());
            }

            pointers.push(BlobPointer {
                key: key.clone(),
                external_path: path,
            });
        }

        debug!(provider = %self.provider_id, objects = pointers.len(), "bucket offloaded");

        serde_json::to_vec(&pointers)
            .map(|json| Some(Bytes::from(json)))
            .map_err(|e| self.pointer_error(e.to_string()))
    }

    async fn load(
        &self,
        _metadata: &Metadata,
        _category: BucketCategory,
        pointer: &Bytes,
    ) -> Result<Bucket, Error> {
        let pointers: Vec<BlobPointer> =
            serde_json::from_slice(pointer).map_err(|e| self.pointer_error(e.to_string()))?;

        let mut bucket = Bucket::new();

        for BlobPointer { key, external_path } in pointers {
            let value = self
                .policy
                .execute("blob_get", || async {
                    self.store.get(&external_path).await.map_err(blob_failure)
                })
                .await?
                .ok_or_else(|| Error::MissingObject {
                    provider: self.provider_id.clone(),
                    path: external_path.clone(),
                })?;

            bucket = bucket.with(key, value);
        }

        Ok(bucket)
    }
}
