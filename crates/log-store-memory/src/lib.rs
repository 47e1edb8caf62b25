//! In-memory (single node) log store with consumer groups for local
//! development and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connection;
mod state;

pub use connection::{MemoryConnection, MemoryConnector};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use proven_log_store::{EntryId, Error};

use state::State;

/// Shared in-memory log store. Clones see the same data.
#[derive(Clone, Debug, Default)]
pub struct MemoryLogStore {
    faults: Arc<Faults>,
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct Faults {
    acks: AtomicUsize,
    appends: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryLogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector handing out sessions against this store.
    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::new(self.clone())
    }

    /// Makes the next `count` appends fail with a connection error.
    pub fn fail_next_appends(&self, count: usize) {
        self.faults.appends.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` acks fail with a connection error.
    pub fn fail_next_acks(&self, count: usize) {
        self.faults.acks.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` group reads fail with a connection error.
    pub fn fail_next_reads(&self, count: usize) {
        self.faults.reads.store(count, Ordering::SeqCst);
    }

    /// Number of entries in `stream`.
    #[must_use]
    pub fn len(&self, stream: &str) -> usize {
        self.state.lock().stream_len(stream)
    }

    /// Whether `stream` is missing or empty.
    #[must_use]
    pub fn is_empty(&self, stream: &str) -> bool {
        self.len(stream) == 0
    }

    /// Delivered but unacknowledged entries of `group`.
    #[must_use]
    pub fn pending(&self, stream: &str, group: &str) -> Vec<EntryId> {
        self.state.lock().pending_ids(stream, group)
    }

    /// Times `id` has been delivered to `group`, if it is pending.
    #[must_use]
    pub fn delivery_count(&self, stream: &str, group: &str, id: EntryId) -> Option<u32> {
        self.state.lock().delivery_count(stream, group, id)
    }

    /// Consumer currently owning pending entry `id`.
    #[must_use]
    pub fn pending_consumer(&self, stream: &str, group: &str, id: EntryId) -> Option<String> {
        self.state.lock().pending_consumer(stream, group, id)
    }

    fn injected(counter: &AtomicUsize, what: &str) -> Result<(), Error> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_or(Ok(()), |_| {
                Err(Error::Connection(format!("injected {what} failure")))
            })
    }
}
