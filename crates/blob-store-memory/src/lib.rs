//! In-memory (single node) blob store for local development.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use proven_blob_store::BlobStore;
use tokio::sync::Mutex;

/// In-memory blob store. Scoped clones share the same objects.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    failing_writes: Arc<AtomicUsize>,
    map: Arc<Mutex<BTreeMap<String, Bytes>>>,
    passing_writes: Arc<AtomicUsize>,
    prefix: Option<String>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A view of this store with every key under `scope/`.
    #[must_use]
    pub fn scope<S: Into<String>>(&self, scope: S) -> Self {
        let scope = scope.into();

        Self {
            failing_writes: self.failing_writes.clone(),
            map: self.map.clone(),
            passing_writes: self.passing_writes.clone(),
            prefix: Some(match &self.prefix {
                Some(existing) => format!("{existing}/{scope}"),
                None => scope,
            }),
        }
    }

    /// Makes the next `count` puts fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes_after(0, count);
    }

    /// Lets `passing` puts through, then makes the following `failing` puts fail.
    pub fn fail_writes_after(&self, passing: usize, failing: usize) {
        self.passing_writes.store(passing, Ordering::SeqCst);
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Number of objects in the whole store, across scopes.
    pub async fn object_count(&self) -> usize {
        self.map.lock().await.len()
    }

    /// Keys in this scope starting with `prefix`, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let full_prefix = self.get_key(prefix);
        let map = self.map.lock().await;

        map.range(full_prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&full_prefix))
            .filter_map(|(key, _)| self.strip_key(key).map(ToString::to_string))
            .collect()
    }

    fn get_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    fn strip_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        match &self.prefix {
            Some(prefix) => key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/')),
            None => Some(key),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    type Error = Error;

    async fn del(&self, key: &str) -> Result<(), Self::Error> {
        self.map.lock().await.remove(&self.get_key(key));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, Self::Error> {
        Ok(self.map.lock().await.get(&self.get_key(key)).cloned())
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), Self::Error> {
        let passes = self
            .passing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if !passes
            && self
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(Error::Injected(key.to_string()));
        }

        self.map.lock().await.insert(self.get_key(key), bytes);
        Ok(())
    }
}
