use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use proven_announcement::{Announcement, Bucket, Metadata};
use tracing::{debug, warn};

use crate::ack::{AckBehavior, AckHandle};

/// Error type returned by handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes announcements for one `(operation, version, signature)` route.
#[async_trait]
pub trait AnnouncementHandler: Send + Sync {
    /// Handles one announcement.
    async fn handle(&self, announcement: Announcement, ack: AckHandle) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> AnnouncementHandler for F
where
    F: Fn(Announcement, AckHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, announcement: Announcement, ack: AckHandle) -> Result<(), HandlerError> {
        self(announcement, ack).await
    }
}

/// Catch-all invoked when no handler matches an announcement's route,
/// typically to reinterpret retired signatures.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    /// Returns whether the announcement was handled.
    async fn handle(&self, context: FallbackContext) -> Result<bool, HandlerError>;
}

#[async_trait]
impl<F, Fut> FallbackHandler for F
where
    F: Fn(FallbackContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, HandlerError>> + Send + 'static,
{
    async fn handle(&self, context: FallbackContext) -> Result<bool, HandlerError> {
        self(context).await
    }
}

/// Dispatch key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RouteKey {
    /// Operation name.
    pub operation: String,

    /// Operation version.
    pub version: u32,

    /// Parameter signature.
    pub params_signature: String,
}

impl RouteKey {
    /// Creates a key.
    pub fn new<O, S>(operation: O, version: u32, params_signature: S) -> Self
    where
        O: Into<String>,
        S: Into<String>,
    {
        Self {
            operation: operation.into(),
            version,
            params_signature: params_signature.into(),
        }
    }

    /// The key an announcement with `metadata` routes to.
    #[must_use]
    pub fn of(metadata: &Metadata) -> Self {
        Self::new(
            metadata.operation(),
            metadata.version(),
            metadata.params_signature(),
        )
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}({})",
            self.operation, self.version, self.params_signature
        )
    }
}

/// What happened to one dispatched announcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// A direct handler returned `Ok`.
    Handled,

    /// A direct handler failed.
    Failed,

    /// A direct handler exceeded the handler timeout.
    TimedOut,

    /// The fallback handled it.
    Recovered,

    /// Neither a handler nor the fallback took it.
    Unhandled,
}

/// Routing table from [`RouteKey`] to handler, plus an optional fallback.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    fallback: Option<Arc<dyn FallbackHandler>>,
    routes: HashMap<RouteKey, Arc<dyn AnnouncementHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for exactly `key`.
    #[must_use]
    pub fn with_handler<H>(mut self, key: RouteKey, handler: H) -> Self
    where
        H: AnnouncementHandler + 'static,
    {
        self.routes.insert(key, Arc::new(handler));
        self
    }

    /// Registers the fallback.
    #[must_use]
    pub fn with_fallback<H>(mut self, fallback: H) -> Self
    where
        H: FallbackHandler + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Handler registered for `key`.
    #[must_use]
    pub fn resolve(&self, key: &RouteKey) -> Option<Arc<dyn AnnouncementHandler>> {
        self.routes.get(key).cloned()
    }

    /// Routes `announcement` and resolves `ack` according to `behavior`.
    ///
    /// Handler failures and timeouts cancel the handle, leaving the entry
    /// pending for redelivery. Announcements nobody handles are cancelled
    /// with a warning.
    pub async fn dispatch(
        self: &Arc<Self>,
        announcement: Announcement,
        ack: AckHandle,
        behavior: AckBehavior,
        timeout: Option<Duration>,
    ) -> Dispatch {
        let key = RouteKey::of(announcement.metadata());

        let Some(handler) = self.resolve(&key) else {
            return self.fall_back(key, announcement, ack, behavior).await;
        };

        let invocation = handler.handle(announcement, ack.clone());
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, invocation).await.ok(),
            None => Some(invocation.await),
        };

        match result {
            Some(Ok(())) => {
                match behavior {
                    AckBehavior::OnSucceed | AckBehavior::OnFinally => {
                        resolve_ack(&ack, "succeeded").await;
                    }
                    AckBehavior::Manual | AckBehavior::OnFallback => {}
                }
                Dispatch::Handled
            }
            Some(Err(e)) => {
                warn!(route = %key, id = %ack.id(), error = %e, "handler failed");
                finish_failed(&ack, behavior, "failed").await;
                Dispatch::Failed
            }
            None => {
                warn!(route = %key, id = %ack.id(), ?timeout, "handler timed out");
                finish_failed(&ack, behavior, "timeout").await;
                Dispatch::TimedOut
            }
        }
    }

    async fn fall_back(
        self: &Arc<Self>,
        key: RouteKey,
        announcement: Announcement,
        ack: AckHandle,
        behavior: AckBehavior,
    ) -> Dispatch {
        let Some(fallback) = self.fallback.clone() else {
            warn!(route = %key, id = %ack.id(), "no handler for route and no fallback");
            ack.cancel("unhandled");
            return Dispatch::Unhandled;
        };

        let context = FallbackContext {
            ack: ack.clone(),
            announcement,
            registry: self.clone(),
        };

        match fallback.handle(context).await {
            Ok(true) => {
                debug!(route = %key, id = %ack.id(), "fallback handled announcement");
                if behavior != AckBehavior::Manual {
                    resolve_ack(&ack, "fallback").await;
                }
                Dispatch::Recovered
            }
            Ok(false) => {
                warn!(route = %key, id = %ack.id(), "unhandled version mismatch");
                ack.cancel("unhandled");
                Dispatch::Unhandled
            }
            Err(e) => {
                warn!(route = %key, id = %ack.id(), error = %e, "fallback failed");
                ack.cancel("fallback_failed");
                Dispatch::Unhandled
            }
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

async fn resolve_ack(ack: &AckHandle, cause: &str) {
    if let Err(e) = ack.ack(cause).await {
        warn!(id = %ack.id(), error = %e, "failed to acknowledge, entry stays pending");
    }
}

async fn finish_failed(ack: &AckHandle, behavior: AckBehavior, cause: &str) {
    if behavior == AckBehavior::OnFinally {
        resolve_ack(ack, cause).await;
    } else {
        ack.cancel(cause);
    }
}

/// Accessors handed to the fallback.
pub struct FallbackContext {
    ack: AckHandle,
    announcement: Announcement,
    registry: Arc<HandlerRegistry>,
}

impl FallbackContext {
    /// The unroutable announcement.
    #[must_use]
    pub const fn announcement(&self) -> &Announcement {
        &self.announcement
    }

    /// The message's ack handle.
    #[must_use]
    pub const fn ack(&self) -> &AckHandle {
        &self.ack
    }

    /// Raw bytes of one original argument.
    #[must_use]
    pub fn raw_argument(&self, name: &str) -> Option<&Bytes> {
        self.announcement.segments().get(name)
    }

    /// Every raw argument segment.
    #[must_use]
    pub const fn raw_arguments(&self) -> &Bucket {
        self.announcement.segments()
    }

    /// Re-routes the announcement to the handler for a current route.
    ///
    /// Returns `Ok(false)` if no handler is registered for that route.
    ///
    /// # Errors
    ///
    /// Returns the target handler's error.
    pub async fn route_as<O, S>(
        &self,
        operation: O,
        version: u32,
        params_signature: S,
    ) -> Result<bool, HandlerError>
    where
        O: Into<String>,
        S: Into<String>,
    {
        let key = RouteKey::new(operation, version, params_signature);
        let Some(handler) = self.registry.resolve(&key) else {
            return Ok(false);
        };

        let metadata = self.announcement.metadata().clone().with_route(
            key.operation,
            key.version,
            key.params_signature,
        );

        handler
            .handle(
                self.announcement.clone().with_metadata(metadata),
                self.ack.clone(),
            )
            .await
            .map(|()| true)
    }

    /// Like [`Self::route_as`] with the segments replaced, for fallbacks
    /// that translate retired parameter shapes.
    ///
    /// # Errors
    ///
    /// Returns the target handler's error.
    pub async fn route_with<O, S>(
        &self,
        operation: O,
        version: u32,
        params_signature: S,
        segments: Bucket,
    ) -> Result<bool, HandlerError>
    where
        O: Into<String>,
        S: Into<String>,
    {
        let rewritten = Self {
            ack: self.ack.clone(),
            announcement: self.announcement.clone().with_segments(segments),
            registry: self.registry.clone(),
        };

        rewritten.route_as(operation, version, params_signature).await
    }
}

impl fmt::Debug for FallbackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackContext")
            .field("ack", &self.ack)
            .field("route", &RouteKey::of(self.announcement.metadata()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use proven_log_store::EntryId;
    use tracing_test::traced_test;

    use crate::ack::{AckState, Acknowledge};
    use crate::error::Error;

    #[derive(Default)]
    struct CountingAcknowledger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Acknowledge for CountingAcknowledger {
        async fn acknowledge(&self, _id: EntryId) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn announcement(operation: &str, version: u32, signature: &str) -> Announcement {
        Announcement::new(Metadata::new(operation, version).with_params_signature(signature))
            .with_segments(Bucket::new().with("job", "build"))
    }

    fn handle(acknowledger: &Arc<CountingAcknowledger>) -> AckHandle {
        AckHandle::new(EntryId::new(1, 0), "dev:jobs", acknowledger.clone())
    }

    async fn succeed(_: Announcement, _: AckHandle) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn fail(_: Announcement, _: AckHandle) -> Result<(), HandlerError> {
        Err("boom".into())
    }

    async fn hang(_: Announcement, _: AckHandle) -> Result<(), HandlerError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_exact_route_on_succeed_acks() {
        let registry = Arc::new(
            HandlerRegistry::new().with_handler(RouteKey::new("Execute", 2, "job"), succeed),
        );
        let acknowledger = Arc::new(CountingAcknowledger::default());
        let ack = handle(&acknowledger);

        let outcome = registry
            .dispatch(
                announcement("Execute", 2, "job"),
                ack.clone(),
                AckBehavior::OnSucceed,
                None,
            )
            .await;

        assert_eq!(outcome, Dispatch::Handled);
        assert_eq!(ack.state(), AckState::Acked);
        assert_eq!(acknowledger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_cancels_unless_on_finally() {
        let registry = Arc::new(
            HandlerRegistry::new().with_handler(RouteKey::new("Execute", 2, "job"), fail),
        );
        let acknowledger = Arc::new(CountingAcknowledger::default());

        let ack = handle(&acknowledger);
        let outcome = registry
            .dispatch(
                announcement("Execute", 2, "job"),
                ack.clone(),
                AckBehavior::OnSucceed,
                None,
            )
            .await;
        assert_eq!(outcome, Dispatch::Failed);
        assert_eq!(ack.state(), AckState::Cancelled);

        let ack = handle(&acknowledger);
        registry
            .dispatch(
                announcement("Execute", 2, "job"),
                ack.clone(),
                AckBehavior::OnFinally,
                None,
            )
            .await;
        assert_eq!(ack.state(), AckState::Acked);
        assert_eq!(acknowledger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manual_success_leaves_handle_to_handler() {
        let registry = Arc::new(
            HandlerRegistry::new().with_handler(RouteKey::new("Execute", 2, "job"), succeed),
        );
        let acknowledger = Arc::new(CountingAcknowledger::default());
        let ack = handle(&acknowledger);

        registry
            .dispatch(
                announcement("Execute", 2, "job"),
                ack.clone(),
                AckBehavior::Manual,
                None,
            )
            .await;

        assert_eq!(ack.state(), AckState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let registry = Arc::new(
            HandlerRegistry::new().with_handler(RouteKey::new("Execute", 2, "job"), hang),
        );
        let acknowledger = Arc::new(CountingAcknowledger::default());
        let ack = handle(&acknowledger);

        let outcome = registry
            .dispatch(
                announcement("Execute", 2, "job"),
                ack.clone(),
                AckBehavior::OnSucceed,
                Some(Duration::from_secs(1)),
            )
            .await;

        assert_eq!(outcome, Dispatch::TimedOut);
        assert_eq!(ack.state(), AckState::Cancelled);
    }

    #[tokio::test]
    async fn test_fallback_reroutes_with_raw_arguments() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let recorder = seen.clone();

        let registry = Arc::new(
            HandlerRegistry::new()
                .with_handler(
                    RouteKey::new("Execute", 2, "job"),
                    move |announcement: Announcement, _ack: AckHandle| {
                        let recorder = recorder.clone();
                        async move {
                            *recorder.lock().unwrap() = Some(RouteKey::of(announcement.metadata()));
                            Ok::<(), HandlerError>(())
                        }
                    },
                )
                .with_fallback(|context: FallbackContext| async move {
                    assert_eq!(context.raw_argument("job"), Some(&Bytes::from("build")));
                    context.route_as("Execute", 2, "job").await
                }),
        );
        let acknowledger = Arc::new(CountingAcknowledger::default());
        let ack = handle(&acknowledger);

        let outcome = registry
            .dispatch(
                announcement("Execute", 1, "job"),
                ack.clone(),
                AckBehavior::OnSucceed,
                None,
            )
            .await;

        assert_eq!(outcome, Dispatch::Recovered);
        assert_eq!(ack.state(), AckState::Acked);
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(RouteKey::new("Execute", 2, "job"))
        );
    }

    #[traced_test]
    #[tokio::test]
    async fn test_unhandled_version_mismatch_stays_pending() {
        let registry = Arc::new(
            HandlerRegistry::new()
                .with_fallback(|context: FallbackContext| async move {
                    context.route_as("Execute", 3, "job").await
                }),
        );
        let acknowledger = Arc::new(CountingAcknowledger::default());
        let ack = handle(&acknowledger);

        let outcome = registry
            .dispatch(
                announcement("Execute", 1, "job"),
                ack.clone(),
                AckBehavior::OnSucceed,
                None,
            )
            .await;

        assert_eq!(outcome, Dispatch::Unhandled);
        assert_eq!(ack.state(), AckState::Cancelled);
        assert_eq!(acknowledger.calls.load(Ordering::SeqCst), 0);
        assert!(logs_contain("unhandled version mismatch"));
    }
}
