use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use proven_announcement::{MessageOrigin, full_uri};
use proven_log_store::{ConnectionSupervisor, Connector, GroupStart};
use proven_resilience::ResiliencePolicy;
use proven_storage_strategy::{
    HashStorageOptions, HashStorageStrategy, StrategyChain, StrategyRegistration,
};
use tokio_util::sync::CancellationToken;

use crate::ack::AckBehavior;
use crate::backoff::EmptyBackoff;
use crate::interceptor::ConsumerInterceptor;

/// When and how pending entries of dead consumers are reclaimed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleClaimOptions {
    /// Consecutive empty reads that trigger a claim pass. Defaults to 3.
    pub after_empty_reads: u32,

    /// Minimum idle time of a pending entry before it may be claimed.
    /// Defaults to 30 seconds.
    pub min_idle: Duration,

    /// Maximum entries claimed per pass. Defaults to 100.
    pub count: usize,
}

impl Default for StaleClaimOptions {
    fn default() -> Self {
        Self {
            after_empty_reads: 3,
            min_idle: Duration::from_secs(30),
            count: 100,
        }
    }
}

/// Options for replaying a stream without a consumer group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IterationOptions {
    /// Inclusive lower bound. `None` starts at the beginning of the stream.
    pub from: Option<DateTime<Utc>>,

    /// Inclusive upper bound. `None` has no upper bound.
    pub to: Option<DateTime<Utc>>,

    /// Only yield these operations. `None` yields everything.
    pub operations: Option<Vec<String>>,

    /// End the stream once caught up instead of polling. Defaults to true.
    pub exit_when_empty: bool,

    /// Entries fetched per range call. Defaults to 100.
    pub page_size: usize,
}

impl Default for IterationOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            operations: None,
            exit_when_empty: true,
            page_size: 100,
        }
    }
}

impl IterationOptions {
    /// Whether `operation` passes the filter.
    #[must_use]
    pub fn accepts(&self, operation: &str) -> bool {
        self.operations
            .as_ref()
            .is_none_or(|operations| operations.iter().any(|o| o == operation))
    }
}

/// Everything a consumer needs to subscribe to one stream.
///
/// Like producer plans, consumer plans are values: every `with_*` returns a
/// new plan.
pub struct ConsumerPlan<C>
where
    C: Connector,
{
    pub(crate) ack_behavior: AckBehavior,
    pub(crate) batch_size: usize,
    pub(crate) cancellation: CancellationToken,
    pub(crate) consumer_group: String,
    pub(crate) consumer_name: String,
    pub(crate) empty_backoff: EmptyBackoff,
    pub(crate) environment: String,
    pub(crate) group_start: GroupStart,
    pub(crate) handler_timeout: Option<Duration>,
    pub(crate) interceptors: Vec<Arc<dyn ConsumerInterceptor>>,
    pub(crate) max_messages: Option<u64>,
    pub(crate) max_parallelism: usize,
    pub(crate) operation_filter: Option<Vec<String>>,
    pub(crate) origin_filter: MessageOrigin,
    pub(crate) policy: ResiliencePolicy,
    pub(crate) stale_claim: StaleClaimOptions,
    pub(crate) storage: StrategyChain,
    pub(crate) supervisor: Arc<ConnectionSupervisor<C>>,
    pub(crate) until: Option<DateTime<Utc>>,
    pub(crate) uri: String,
}

impl<C> ConsumerPlan<C>
where
    C: Connector,
{
    /// A plan reading payloads from log store hashes, in consumer group
    /// `"default"` under a random consumer name.
    pub fn new(supervisor: Arc<ConnectionSupervisor<C>>) -> Self {
        let policy = ResiliencePolicy::default();
        let storage = StrategyChain::new(Arc::new(HashStorageStrategy::new(
            supervisor.clone(),
            policy.clone(),
            HashStorageOptions::default(),
        )));

        Self {
            ack_behavior: AckBehavior::default(),
            batch_size: 100,
            cancellation: CancellationToken::new(),
            consumer_group: "default".to_string(),
            consumer_name: format!("consumer-{}", uuid::Uuid::new_v4()),
            empty_backoff: EmptyBackoff::default(),
            environment: String::new(),
            group_start: GroupStart::default(),
            handler_timeout: None,
            interceptors: Vec::new(),
            max_messages: None,
            max_parallelism: 1,
            operation_filter: None,
            origin_filter: MessageOrigin::ANY,
            policy,
            stale_claim: StaleClaimOptions::default(),
            storage,
            supervisor,
            until: None,
            uri: String::new(),
        }
    }

    /// Stream key consumed.
    #[must_use]
    pub fn full_uri(&self) -> String {
        full_uri(&self.environment, &self.uri)
    }

    /// Environment prefixing the stream key.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Stream identity within the environment.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Consumer group name.
    #[must_use]
    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    /// Consumer name within the group.
    #[must_use]
    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Ack behavior applied around handlers.
    #[must_use]
    pub const fn ack_behavior(&self) -> AckBehavior {
        self.ack_behavior
    }

    /// The plan's own cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The storage chain.
    #[must_use]
    pub const fn storage(&self) -> &StrategyChain {
        &self.storage
    }

    /// The resilience policy guarding store calls.
    #[must_use]
    pub const fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// Returns a plan consuming `environment`.
    #[must_use]
    pub fn with_environment<S: Into<String>>(&self, environment: S) -> Self {
        Self {
            environment: environment.into(),
            ..self.clone()
        }
    }

    /// Returns a plan consuming `uri`.
    #[must_use]
    pub fn with_uri<S: Into<String>>(&self, uri: S) -> Self {
        Self {
            uri: uri.into(),
            ..self.clone()
        }
    }

    /// Returns a plan joining consumer group `group`.
    #[must_use]
    pub fn with_consumer_group<S: Into<String>>(&self, group: S) -> Self {
        Self {
            consumer_group: group.into(),
            ..self.clone()
        }
    }

    /// Returns a plan reading as consumer `name`.
    #[must_use]
    pub fn with_consumer_name<S: Into<String>>(&self, name: S) -> Self {
        Self {
            consumer_name: name.into(),
            ..self.clone()
        }
    }

    /// Returns a plan whose group, if created by this consumer, starts at
    /// `start`.
    #[must_use]
    pub fn with_group_start(&self, start: GroupStart) -> Self {
        Self {
            group_start: start,
            ..self.clone()
        }
    }

    /// Returns a plan stopped by `token`.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancellation: token,
            ..self.clone()
        }
    }

    /// Returns a plan with a different ack behavior.
    #[must_use]
    pub fn with_ack_behavior(&self, behavior: AckBehavior) -> Self {
        Self {
            ack_behavior: behavior,
            ..self.clone()
        }
    }

    /// Returns a plan reading at most `size` entries per batch.
    #[must_use]
    pub fn with_batch_size(&self, size: usize) -> Self {
        Self {
            batch_size: size.max(1),
            ..self.clone()
        }
    }

    /// Returns a plan running at most `parallelism` handlers at once.
    #[must_use]
    pub fn with_max_parallelism(&self, parallelism: usize) -> Self {
        Self {
            max_parallelism: parallelism.max(1),
            ..self.clone()
        }
    }

    /// Returns a plan that detaches after `count` messages.
    #[must_use]
    pub fn with_max_messages(&self, count: u64) -> Self {
        Self {
            max_messages: Some(count),
            ..self.clone()
        }
    }

    /// Returns a plan that stops at the first entry produced after `until`.
    #[must_use]
    pub fn with_until(&self, until: DateTime<Utc>) -> Self {
        Self {
            until: Some(until),
            ..self.clone()
        }
    }

    /// Returns a plan with different stale claim settings.
    #[must_use]
    pub fn with_stale_claim(&self, stale_claim: StaleClaimOptions) -> Self {
        Self {
            stale_claim,
            ..self.clone()
        }
    }

    /// Returns a plan with a different empty-read backoff.
    #[must_use]
    pub fn with_empty_backoff(&self, backoff: EmptyBackoff) -> Self {
        Self {
            empty_backoff: backoff,
            ..self.clone()
        }
    }

    /// Returns a plan that treats handlers running longer than `timeout` as
    /// failed.
    #[must_use]
    pub fn with_handler_timeout(&self, timeout: Duration) -> Self {
        Self {
            handler_timeout: Some(timeout),
            ..self.clone()
        }
    }

    /// Returns a plan with `interceptor` appended.
    #[must_use]
    pub fn with_interceptor(&self, interceptor: Arc<dyn ConsumerInterceptor>) -> Self {
        let mut plan = self.clone();
        plan.interceptors.push(interceptor);
        plan
    }

    /// Returns a plan dispatching only `operations`. Others are acked and
    /// skipped.
    #[must_use]
    pub fn with_operation_filter<I, S>(&self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation_filter: Some(operations.into_iter().map(Into::into).collect()),
            ..self.clone()
        }
    }

    /// Returns a plan dispatching only announcements whose origin intersects
    /// `origin`.
    #[must_use]
    pub fn with_origin_filter(&self, origin: MessageOrigin) -> Self {
        Self {
            origin_filter: origin,
            ..self.clone()
        }
    }

    /// Returns a plan with a different resilience policy.
    #[must_use]
    pub fn with_policy(&self, policy: ResiliencePolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    /// Returns a plan with a different storage chain.
    #[must_use]
    pub fn with_storage(&self, storage: StrategyChain) -> Self {
        Self {
            storage,
            ..self.clone()
        }
    }

    /// Returns a plan with `registration` appended to the storage chain.
    #[must_use]
    pub fn with_storage_strategy(&self, registration: StrategyRegistration) -> Self {
        self.with_storage(self.storage.clone().with_strategy(registration))
    }

    pub(crate) fn accepts_operation(&self, operation: &str) -> bool {
        self.operation_filter
            .as_ref()
            .is_none_or(|operations| operations.iter().any(|o| o == operation))
    }
}

impl<C> Clone for ConsumerPlan<C>
where
    C: Connector,
{
    fn clone(&self) -> Self {
        Self {
            ack_behavior: self.ack_behavior,
            batch_size: self.batch_size,
            cancellation: self.cancellation.clone(),
            consumer_group: self.consumer_group.clone(),
            consumer_name: self.consumer_name.clone(),
            empty_backoff: self.empty_backoff.clone(),
            environment: self.environment.clone(),
            group_start: self.group_start,
            handler_timeout: self.handler_timeout,
            interceptors: self.interceptors.clone(),
            max_messages: self.max_messages,
            max_parallelism: self.max_parallelism,
            operation_filter: self.operation_filter.clone(),
            origin_filter: self.origin_filter,
            policy: self.policy.clone(),
            stale_claim: self.stale_claim.clone(),
            storage: self.storage.clone(),
            supervisor: self.supervisor.clone(),
            until: self.until,
            uri: self.uri.clone(),
        }
    }
}

impl<C> fmt::Debug for ConsumerPlan<C>
where
    C: Connector,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerPlan")
            .field("ack_behavior", &self.ack_behavior)
            .field("batch_size", &self.batch_size)
            .field("consumer_group", &self.consumer_group)
            .field("consumer_name", &self.consumer_name)
            .field("environment", &self.environment)
            .field("handler_timeout", &self.handler_timeout)
            .field("interceptors", &self.interceptors.len())
            .field("max_messages", &self.max_messages)
            .field("max_parallelism", &self.max_parallelism)
            .field("operation_filter", &self.operation_filter)
            .field("origin_filter", &self.origin_filter)
            .field("stale_claim", &self.stale_claim)
            .field("storage", &self.storage)
            .field("until", &self.until)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}
