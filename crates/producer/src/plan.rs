use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use proven_announcement::DEFAULT_CHANNEL_TYPE;
use proven_log_store::{ConnectionSupervisor, Connector};
use proven_resilience::ResiliencePolicy;
use proven_storage_strategy::{
    HashStorageOptions, HashStorageStrategy, StrategyChain, StrategyRegistration,
};

use crate::interceptor::ProducerInterceptor;
use crate::segmentation::SegmentationStrategy;

/// Everything a producer needs to publish to one stream.
///
/// Plans are values: every `with_*` returns a new plan and leaves the
/// original untouched.
pub struct ProducerPlan<C>
where
    C: Connector,
{
    pub(crate) channel_type: String,
    pub(crate) environment: String,
    pub(crate) interceptors: Vec<Arc<dyn ProducerInterceptor>>,
    pub(crate) policy: ResiliencePolicy,
    pub(crate) segmentation: Vec<Arc<dyn SegmentationStrategy>>,
    pub(crate) storage: StrategyChain,
    pub(crate) supervisor: Arc<ConnectionSupervisor<C>>,
    pub(crate) uri: String,
}

impl<C> ProducerPlan<C>
where
    C: Connector,
{
    /// A plan storing payloads inline as hashes in the log store.
    pub fn new(supervisor: Arc<ConnectionSupervisor<C>>) -> Self {
        let policy = ResiliencePolicy::default();
        let storage = StrategyChain::new(Arc::new(HashStorageStrategy::new(
            supervisor.clone(),
            policy.clone(),
            HashStorageOptions::default(),
        )));

        Self {
            channel_type: DEFAULT_CHANNEL_TYPE.to_string(),
            environment: String::new(),
            interceptors: Vec::new(),
            policy,
            segmentation: Vec::new(),
            storage,
            supervisor,
            uri: String::new(),
        }
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

    /// The storage chain.
    #[must_use]
    pub const fn storage(&self) -> &StrategyChain {
        &self.storage
    }

    /// The resilience policy guarding appends.
    #[must_use]
    pub const fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// The connection supervisor.
    #[must_use]
    pub const fn supervisor(&self) -> &Arc<ConnectionSupervisor<C>> {
        &self.supervisor
    }

    /// Returns a plan targeting `environment`.
    #[must_use]
    pub fn with_environment<S: Into<String>>(&self, environment: S) -> Self {
        Self {
            environment: environment.into(),
            ..self.clone()
        }
    }

    /// Returns a plan targeting `uri`.
    #[must_use]
    pub fn with_uri<S: Into<String>>(&self, uri: S) -> Self {
        Self {
            uri: uri.into(),
            ..self.clone()
        }
    }

    /// Returns a plan with a different transport tag.
    #[must_use]
    pub fn with_channel_type<S: Into<String>>(&self, channel_type: S) -> Self {
        Self {
            channel_type: channel_type.into(),
            ..self.clone()
        }
    }

    /// Returns a plan with `interceptor` appended.
    #[must_use]
    pub fn with_interceptor(&self, interceptor: Arc<dyn ProducerInterceptor>) -> Self {
        let mut plan = self.clone();
        plan.interceptors.push(interceptor);
        plan
    }

    /// Returns a plan with `strategy` appended to the segmentation list.
    #[must_use]
    pub fn with_segmentation(&self, strategy: Arc<dyn SegmentationStrategy>) -> Self {
        let mut plan = self.clone();
        plan.segmentation.push(strategy);
        plan
    }

    /// Returns a plan with a different resilience policy for appends.
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
}

impl<C> Clone for ProducerPlan<C>
where
    C: Connector,
{
    fn clone(&self) -> Self {
        Self {
            channel_type: self.channel_type.clone(),
            environment: self.environment.clone(),
            interceptors: self.interceptors.clone(),
            policy: self.policy.clone(),
            segmentation: self.segmentation.clone(),
            storage: self.storage.clone(),
            supervisor: self.supervisor.clone(),
            uri: self.uri.clone(),
        }
    }
}

impl<C> fmt::Debug for ProducerPlan<C>
where
    C: Connector,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerPlan")
            .field("channel_type", &self.channel_type)
            .field("environment", &self.environment)
            .field("interceptors", &self.interceptors.len())
            .field("policy", &self.policy)
            .field("segmentation", &self.segmentation.len())
            .field("storage", &self.storage)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

/// One call to publish: operation, version, and named arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    arguments: Vec<(String, Bytes)>,
    message_id: Option<String>,
    operation: String,
    params_signature: Option<String>,
    version: u32,
}

impl Invocation {
    /// A call to `operation` at `version` with no arguments.
    #[must_use]
    pub fn new<O: Into<String>>(operation: O, version: u32) -> Self {
        Self {
            arguments: Vec::new(),
            message_id: None,
            operation: operation.into(),
            params_signature: None,
            version,
        }
    }

    /// Adds an argument.
    #[must_use]
    pub fn with_argument<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<Bytes>,
    {
        self.arguments.push((name.into(), value.into()));
        self
    }

    /// Overrides the parameter signature, which otherwise is the
    /// comma-joined argument names.
    #[must_use]
    pub fn with_params_signature<S: Into<String>>(mut self, signature: S) -> Self {
        self.params_signature = Some(signature.into());
        self
    }

    /// Uses a caller-chosen message id instead of a random one.
    #[must_use]
    pub fn with_message_id<S: Into<String>>(mut self, message_id: S) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Operation version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Arguments in call order.
    #[must_use]
    pub fn arguments(&self) -> &[(String, Bytes)] {
        &self.arguments
    }

    /// Parameter signature used for version routing.
    #[must_use]
    pub fn params_signature(&self) -> String {
        self.params_signature.clone().unwrap_or_else(|| {
            self.arguments
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        })
    }

    pub(crate) fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }
}
