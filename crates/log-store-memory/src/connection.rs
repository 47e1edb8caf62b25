use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use proven_log_store::{
    Connector, EntryId, Error, GroupStart, LogConnection, StreamEntry,
};
use tracing::debug;

use crate::MemoryLogStore;

/// Hands out [`MemoryConnection`]s and remembers every one it issued.
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    failing_connects: Arc<AtomicUsize>,
    issued: Arc<Mutex<Vec<MemoryConnection>>>,
    store: MemoryLogStore,
}

impl MemoryConnector {
    pub(crate) fn new(store: MemoryLogStore) -> Self {
        Self {
            failing_connects: Arc::new(AtomicUsize::new(0)),
            issued: Arc::new(Mutex::new(Vec::new())),
            store,
        }
    }

    /// Number of connections opened so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.issued.lock().len()
    }

    /// The most recently opened connection.
    #[must_use]
    pub fn last_connection(&self) -> Option<MemoryConnection> {
        self.issued.lock().last().cloned()
    }

    /// Makes the next `count` connects fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection, Error> {
        MemoryLogStore::injected(&self.failing_connects, "connect")?;

        let connection = MemoryConnection {
            closed: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
            store: self.store.clone(),
        };

        self.issued.lock().push(connection.clone());

        Ok(connection)
    }
}

/// A session against a [`MemoryLogStore`].
#[derive(Clone, Debug)]
pub struct MemoryConnection {
    closed: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
    store: MemoryLogStore,
}

impl MemoryConnection {
    /// Makes the session report itself unhealthy.
    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// Whether [`LogConnection::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LogConnection for MemoryConnection {
    fn is_healthy(&self) -> bool {
        !self.is_closed() && self.healthy.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("memory log connection closed");
        }
    }

    async fn append(
        &self,
        stream: &str,
        fields: Vec<(String, Bytes)>,
    ) -> Result<Option<EntryId>, Error> {
        self.ensure_open()?;
        MemoryLogStore::injected(&self.store.faults.appends, "append")?;

        Ok(Some(self.store.state.lock().append(stream, fields)))
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), Error> {
        self.ensure_open()?;

        self.store.state.lock().create_group(stream, group, start)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error> {
        self.ensure_open()?;
        MemoryLogStore::injected(&self.store.faults.reads, "read")?;

        self.store
            .state
            .lock()
            .read_group(stream, group, consumer, count)
    }

    async fn ack(&self, stream: &str, group: &str, id: EntryId) -> Result<bool, Error> {
        self.ensure_open()?;
        MemoryLogStore::injected(&self.store.faults.acks, "ack")?;

        self.store.state.lock().ack(stream, group, id)
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error> {
        self.ensure_open()?;

        self.store
            .state
            .lock()
            .claim_stale(stream, group, consumer, min_idle, count)
    }

    async fn range(
        &self,
        stream: &str,
        from: EntryId,
        to: EntryId,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error> {
        self.ensure_open()?;

        Ok(self.store.state.lock().range(stream, from, to, count))
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: Vec<(String, Bytes)>,
        ttl: Option<Duration>,
    ) -> Result<(), Error> {
        self.ensure_open()?;
        self.store.state.lock().hash_set(key, fields, ttl);

        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, Bytes)>, Error> {
        self.ensure_open()?;

        Ok(self.store.state.lock().hash_get_all(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    const STREAM: &str = "dev:orders";
    const GROUP: &str = "billing";

    fn fields(message: &str) -> Vec<(String, Bytes)> {
        vec![("message".to_string(), Bytes::from(message.to_string()))]
    }

    async fn connection() -> (MemoryLogStore, MemoryConnection) {
        let store = MemoryLogStore::new();
        let connection = store.connector().connect().await.unwrap();
        (store, connection)
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let (store, connection) = connection().await;

        let first = connection.append(STREAM, fields("a")).await.unwrap().unwrap();
        let second = connection.append(STREAM, fields("b")).await.unwrap().unwrap();

        assert!(first < second);
        assert_eq!(store.len(STREAM), 2);
    }

    #[tokio::test]
    async fn test_create_group_requires_stream_and_is_idempotent() {
        let (_, connection) = connection().await;

        assert_matches!(
            connection
                .create_group(STREAM, GROUP, GroupStart::Beginning)
                .await,
            Err(Error::StreamNotFound(_))
        );

        connection.append(STREAM, fields("a")).await.unwrap();
        connection
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .await
            .unwrap();
        connection
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_group_tracks_pending_until_ack() {
        let (store, connection) = connection().await;
        let id = connection.append(STREAM, fields("a")).await.unwrap().unwrap();
        connection
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .await
            .unwrap();

        let batch = connection.read_group(STREAM, GROUP, "c1", 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(store.pending(STREAM, GROUP), vec![id]);

        let again = connection.read_group(STREAM, GROUP, "c1", 10).await.unwrap();
        assert!(again.is_empty());

        assert!(connection.ack(STREAM, GROUP, id).await.unwrap());
        assert!(!connection.ack(STREAM, GROUP, id).await.unwrap());
        assert!(store.pending(STREAM, GROUP).is_empty());
    }

    #[tokio::test]
    async fn test_latest_group_skips_existing_entries() {
        let (_, connection) = connection().await;
        connection.append(STREAM, fields("old")).await.unwrap();
        connection
            .create_group(STREAM, GROUP, GroupStart::Latest)
            .await
            .unwrap();
        connection.append(STREAM, fields("new")).await.unwrap();

        let batch = connection.read_group(STREAM, GROUP, "c1", 10).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].field("message"), Some(&Bytes::from("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_stale_respects_idle_time() {
        let (store, connection) = connection().await;
        let id = connection.append(STREAM, fields("a")).await.unwrap().unwrap();
        connection
            .create_group(STREAM, GROUP, GroupStart::Beginning)
            .await
            .unwrap();
        connection.read_group(STREAM, GROUP, "dead", 10).await.unwrap();

        let idle = Duration::from_secs(30);
        let early = connection
            .claim_stale(STREAM, GROUP, "alive", idle, 10)
            .await
            .unwrap();
        assert!(early.is_empty());

        tokio::time::advance(idle).await;

        let claimed = connection
            .claim_stale(STREAM, GROUP, "alive", idle, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(
            store.pending_consumer(STREAM, GROUP, id).as_deref(),
            Some("alive")
        );
        assert_eq!(store.delivery_count(STREAM, GROUP, id), Some(2));
    }

    #[tokio::test]
    async fn test_range_is_inclusive() {
        let (_, connection) = connection().await;
        let mut ids = Vec::new();
        for message in ["a", "b", "c"] {
            ids.push(connection.append(STREAM, fields(message)).await.unwrap().unwrap());
        }

        let middle = connection.range(STREAM, ids[1], ids[2], 10).await.unwrap();
        assert_eq!(middle.len(), 2);

        let first = connection
            .range(STREAM, EntryId::ZERO, EntryId::MAX, 1)
            .await
            .unwrap();
        assert_eq!(first[0].id, ids[0]);

        let missing = connection
            .range("dev:missing", EntryId::ZERO, EntryId::MAX, 10)
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_expires_after_ttl() {
        let (_, connection) = connection().await;

        connection
            .hash_set("h", fields("a"), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(connection.hash_get_all("h").await.unwrap(), fields("a"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(connection.hash_get_all("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let (store, connection) = connection().await;
        store.fail_next_appends(1);

        assert_matches!(
            connection.append(STREAM, fields("a")).await,
            Err(Error::Connection(_))
        );
        assert!(connection.append(STREAM, fields("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_calls() {
        let (_, connection) = connection().await;
        connection.close().await;

        assert!(!connection.is_healthy());
        assert_matches!(
            connection.append(STREAM, fields("a")).await,
            Err(Error::Closed)
        );
    }
}
