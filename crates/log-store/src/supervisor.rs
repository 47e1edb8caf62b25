use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::Error;
use crate::{Connector, LogConnection};

/// Options for [`ConnectionSupervisor`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Minimum time between reconnects. Defaults to 5 seconds.
    pub reconnect_cooldown: Duration,

    /// Delay before a replaced connection is closed. Defaults to 5 seconds.
    pub close_grace: Duration,

    /// Bounded wait for the reconnect lock. Defaults to 10 seconds.
    pub lock_wait: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            reconnect_cooldown: Duration::from_secs(5),
            close_grace: Duration::from_secs(5),
            lock_wait: Duration::from_secs(10),
        }
    }
}

/// Holds the shared connection for one logical client and replaces it when
/// it goes unhealthy.
///
/// Reads are lock-free. Reconnects are serialized by a single lock and
/// rate-limited by a cooldown: inside the cooldown a stale connection is
/// handed out rather than opening another one.
#[derive(Debug)]
pub struct ConnectionSupervisor<C>
where
    C: Connector,
{
    attempts: AtomicU64,
    connection: ArcSwapOption<C::Connection>,
    connector: C,
    disposed: AtomicBool,
    healthy: AtomicBool,
    last_reset: Mutex<Option<Instant>>,
    options: SupervisorOptions,
}

impl<C> ConnectionSupervisor<C>
where
    C: Connector,
{
    /// Creates a supervisor. No connection is opened until the first
    /// [`Self::acquire`].
    #[must_use]
    pub fn new(connector: C, options: SupervisorOptions) -> Self {
        Self {
            attempts: AtomicU64::new(0),
            connection: ArcSwapOption::empty(),
            connector,
            disposed: AtomicBool::new(false),
            healthy: AtomicBool::new(false),
            last_reset: Mutex::new(None),
            options,
        }
    }

    /// Number of connection attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Whether `connection` can serve requests.
    #[must_use]
    pub fn healthy(&self, connection: &C::Connection) -> bool {
        let healthy = connection.is_healthy();

        if self.healthy.swap(healthy, Ordering::AcqRel) != healthy {
            if healthy {
                info!(attempt = self.attempts(), "log store connection healthy");
            } else {
                warn!(attempt = self.attempts(), "log store connection unhealthy");
            }
        }

        healthy
    }

    /// Returns the shared connection, reconnecting if it is unhealthy and
    /// the cooldown has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disposed`] after disposal, [`Error::LockTimeout`] if
    /// the reconnect lock could not be taken in time, or the connector's
    /// error if connecting failed.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<C::Connection, Error> {
        self.ensure_live()?;

        if let Some(current) = self.connection.load_full() {
            if self.healthy(&current) {
                return Ok((*current).clone());
            }
        }

        let mut last_reset = tokio::time::timeout(self.options.lock_wait, self.last_reset.lock())
            .await
            .map_err(|_| Error::LockTimeout)?;

        self.ensure_live()?;

        // Another caller may have reconnected while we waited.
        let current = self.connection.load_full();
        if let Some(current) = &current {
            if self.healthy(current) {
                return Ok((**current).clone());
            }

            if let Some(reset_at) = *last_reset {
                if reset_at.elapsed() < self.options.reconnect_cooldown {
                    debug!(
                        attempt = self.attempts(),
                        "reconnect cooldown active, returning stale connection"
                    );
                    return Ok((**current).clone());
                }
            }
        }

        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        *last_reset = Some(Instant::now());
        info!(attempt, "connecting to log store");

        let fresh = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(attempt, error = ?e, "failed to connect to log store");
                return Err(e);
            }
        };

        self.healthy(&fresh);

        if let Some(previous) = self.connection.swap(Some(Arc::new(fresh.clone()))) {
            let grace = self.options.close_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                previous.close().await;
                debug!("closed replaced log store connection");
            });
        }

        drop(last_reset);

        Ok(fresh)
    }

    /// Closes the current connection. Later calls do nothing.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(connection) = self.connection.swap(None) {
            connection.close().await;
        }

        info!(attempts = self.attempts(), "connection supervisor disposed");
    }

    fn ensure_live(&self) -> Result<(), Error> {
        if self.disposed.load(Ordering::Acquire) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }
}
