//! Abstract interface for append-only log stores with consumer groups.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod entry;
mod error;
mod supervisor;

pub use entry::{EntryId, GroupStart, StreamEntry};
pub use error::Error;
pub use supervisor::{ConnectionSupervisor, SupervisorOptions};

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Opens connections to a log store.
#[async_trait]
pub trait Connector: Clone + Debug + Send + Sync + 'static {
    /// Connection type produced.
    type Connection: LogConnection;

    /// Establishes a fresh connection.
    async fn connect(&self) -> Result<Self::Connection, Error>;
}

/// One session against a log store.
///
/// Streams are keyed by full uri. Each stream has consumer groups, each
/// group tracks its last delivered id and a pending-entries list of
/// delivered but unacknowledged entries per consumer.
#[async_trait]
pub trait LogConnection: Clone + Debug + Send + Sync + 'static {
    /// Whether the session can still serve requests.
    fn is_healthy(&self) -> bool;

    /// Closes the session. Closing twice is a no-op.
    async fn close(&self);

    /// Appends one entry atomically, creating the stream if needed.
    async fn append(
        &self,
        stream: &str,
        fields: Vec<(String, Bytes)>,
    ) -> Result<Option<EntryId>, Error>;

    /// Creates a consumer group.
    ///
    /// Succeeds if the group already exists. Fails with
    /// [`Error::StreamNotFound`] if the stream does not exist.
    async fn create_group(&self, stream: &str, group: &str, start: GroupStart)
    -> Result<(), Error>;

    /// Delivers up to `count` never-delivered entries to `consumer`, adding
    /// them to its pending list.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error>;

    /// Removes an entry from the group's pending list. Returns whether it
    /// was pending.
    async fn ack(&self, stream: &str, group: &str, id: EntryId) -> Result<bool, Error>;

    /// Reassigns up to `count` pending entries idle for at least `min_idle`
    /// to `consumer` and returns them.
    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error>;

    /// Reads up to `count` entries with ids in `from..=to`, without a group.
    async fn range(
        &self,
        stream: &str,
        from: EntryId,
        to: EntryId,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error>;

    /// Writes a hash, replacing any previous value, with an optional ttl.
    async fn hash_set(
        &self,
        key: &str,
        fields: Vec<(String, Bytes)>,
        ttl: Option<Duration>,
    ) -> Result<(), Error>;

    /// Reads every field of a hash. Missing or expired hashes are empty.
    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, Bytes)>, Error>;
}
