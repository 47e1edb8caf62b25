use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use proven_log_store::{ConnectionSupervisor, Connector, EntryId, LogConnection};
use proven_resilience::ResiliencePolicy;
use tracing::debug;

use crate::error::Error;
use crate::metrics::ConsumerMetrics;

const PENDING: u8 = 0;
const ACKING: u8 = 1;
const ACKED: u8 = 2;
const CANCELLED: u8 = 3;

/// How a message's ack handle is resolved around its handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AckBehavior {
    /// Ack when the handler returns `Ok`, cancel when it fails.
    #[default]
    OnSucceed,

    /// Ack once the handler finishes, whatever the outcome.
    OnFinally,

    /// The handler resolves the handle itself. Failures still cancel an
    /// unresolved handle.
    Manual,

    /// Like [`Self::Manual`] for direct handlers; announcements the fallback
    /// reports as handled are acked automatically.
    OnFallback,
}

/// Resolution state of an [`AckHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckState {
    /// Not resolved yet.
    Pending,

    /// Acknowledged against the store.
    Acked,

    /// Cancelled; the entry stays pending in the store for reclamation.
    Cancelled,
}

/// Store-side acknowledgment primitive.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Removes `id` from the pending list.
    async fn acknowledge(&self, id: EntryId) -> Result<(), Error>;
}

/// Acknowledges entries of one consumer group through a supervisor.
pub struct StreamAcknowledger<C>
where
    C: Connector,
{
    group: String,
    policy: ResiliencePolicy,
    stream: String,
    supervisor: Arc<ConnectionSupervisor<C>>,
}

impl<C> StreamAcknowledger<C>
where
    C: Connector,
{
    /// Creates an acknowledger for `group` on `stream`.
    pub const fn new(
        supervisor: Arc<ConnectionSupervisor<C>>,
        policy: ResiliencePolicy,
        stream: String,
        group: String,
    ) -> Self {
        Self {
            group,
            policy,
            stream,
            supervisor,
        }
    }
}

#[async_trait]
impl<C> Acknowledge for StreamAcknowledger<C>
where
    C: Connector,
{
    async fn acknowledge(&self, id: EntryId) -> Result<(), Error> {
        self.policy
            .execute("ack", || async {
                self.supervisor
                    .acquire()
                    .await?
                    .ack(&self.stream, &self.group, id)
                    .await
            })
            .await
            .map(|was_pending| {
                if !was_pending {
                    debug!(stream = %self.stream, %id, "entry was no longer pending");
                }
            })
            .map_err(|source| Error::Ack { id, source })
    }
}

/// Per-message acknowledgment token.
///
/// The first of [`Self::ack`] or [`Self::cancel`] to take effect wins and
/// later calls are no-ops. Clones share the same state.
#[derive(Clone)]
pub struct AckHandle {
    inner: Arc<Inner>,
}

struct Inner {
    acknowledger: Arc<dyn Acknowledge>,
    id: EntryId,
    state: AtomicU8,
    uri: String,
}

impl AckHandle {
    /// Creates an unresolved handle for entry `id` of stream `uri`.
    pub fn new<S: Into<String>>(id: EntryId, uri: S, acknowledger: Arc<dyn Acknowledge>) -> Self {
        Self {
            inner: Arc::new(Inner {
                acknowledger,
                id,
                state: AtomicU8::new(PENDING),
                uri: uri.into(),
            }),
        }
    }

    /// Entry this handle resolves.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.inner.id
    }

    /// Current state. An acknowledgment in flight reads as pending.
    #[must_use]
    pub fn state(&self) -> AckState {
        match self.inner.state.load(Ordering::Acquire) {
            ACKED => AckState::Acked,
            CANCELLED => AckState::Cancelled,
            _ => AckState::Pending,
        }
    }

    /// Whether the handle has been acked or cancelled, or an ack is in flight.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != PENDING
    }

    /// Acknowledges the entry against the store.
    ///
    /// Returns `Ok(false)` if the handle was already resolved.
    ///
    /// # Errors
    ///
    /// If the store call fails the handle reverts to pending and the error is
    /// returned, so the caller may retry.
    pub async fn ack(&self, cause: &str) -> Result<bool, Error> {
        if self
            .inner
            .state
            .compare_exchange(PENDING, ACKING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }

        match self.inner.acknowledger.acknowledge(self.inner.id).await {
            Ok(()) => {
                self.inner.state.store(ACKED, Ordering::Release);
                self.record("acked", cause);
                Ok(true)
            }
            Err(e) => {
                self.inner.state.store(PENDING, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Gives up on the entry locally. The store is not touched, so the entry
    /// stays pending and will be reclaimed.
    ///
    /// Returns `false` if the handle was already resolved.
    pub fn cancel(&self, cause: &str) -> bool {
        let cancelled = self
            .inner
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if cancelled {
            self.record("cancelled", cause);
        }

        cancelled
    }

    fn record(&self, outcome: &str, cause: &str) {
        ConsumerMetrics::get()
            .resolutions
            .with_label_values(&[outcome, cause, self.inner.uri.as_str()])
            .inc();
        debug!(id = %self.inner.id, outcome, cause, uri = %self.inner.uri, "ack handle resolved");
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("uri", &self.inner.uri)
            .finish()
    }
}
