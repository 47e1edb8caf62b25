use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use chrono::Utc;
use futures::{Stream, StreamExt};
use proven_announcement::{Announcement, BucketCategory, wire};
use proven_log_store::{Connector, EntryId, LogConnection, StreamEntry};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::ack::{AckHandle, Acknowledge, StreamAcknowledger};
use crate::backoff::EmptyBackoff;
use crate::error::Error;
use crate::handler::{Dispatch, HandlerRegistry};
use crate::metrics::ConsumerMetrics;
use crate::plan::{ConsumerPlan, IterationOptions};

/// Observable position of a pipeline in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started.
    Idle,

    /// The consumer group exists.
    Subscribed,

    /// Reading or processing a batch.
    BatchRead,

    /// Waiting after an empty read.
    EmptyBackoff,

    /// Reclaiming stale pending entries.
    StaleClaim,

    /// Leaving the loop.
    Draining,

    /// Finished.
    Stopped,
}

struct BatchOutcome {
    processed: u64,
    reached_until: bool,
}

/// Consumes one stream through a consumer group and dispatches each
/// announcement to the handler registered for its route.
///
/// Delivery is at least once: entries whose handler fails stay pending and
/// are reclaimed by a later stale claim pass.
pub struct ConsumerPipeline<C>
where
    C: Connector,
{
    acknowledger: Arc<dyn Acknowledge>,
    plan: ConsumerPlan<C>,
    registry: Arc<HandlerRegistry>,
    state: watch::Sender<PipelineState>,
    stream: String,
}

impl<C> ConsumerPipeline<C>
where
    C: Connector,
{
    /// Creates a pipeline for `plan` dispatching through `registry`.
    pub fn new(plan: ConsumerPlan<C>, registry: HandlerRegistry) -> Self {
        let stream = plan.full_uri();
        let acknowledger = Arc::new(StreamAcknowledger::new(
            plan.supervisor.clone(),
            plan.policy.clone(),
            stream.clone(),
            plan.consumer_group.clone(),
        ));
        let (state, _) = watch::channel(PipelineState::Idle);

        Self {
            acknowledger,
            plan,
            registry: Arc::new(registry),
            state,
            stream,
        }
    }

    /// The plan in use.
    pub const fn plan(&self) -> &ConsumerPlan<C> {
        &self.plan
    }

    /// Receiver following the pipeline state.
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Runs the consume loop until `cancel` or the plan's token fires, the
    /// message limit is reached, or an entry past the upper time bound
    /// arrives.
    ///
    /// Returns the number of entries processed. Store failures are logged
    /// and retried; handler failures leave their entry pending.
    #[instrument(
        skip(self, cancel),
        fields(stream = %self.stream, group = %self.plan.consumer_group, consumer = %self.plan.consumer_name)
    )]
    pub async fn run(&self, cancel: &CancellationToken) -> u64 {
        let token = self.linked(cancel);
        let _stop_watcher = token.clone().drop_guard();

        info!("consumer starting");

        let consumed = if self.ensure_group(&token).await {
            self.set_state(PipelineState::Subscribed);
            self.consume(&token).await
        } else {
            0
        };

        self.set_state(PipelineState::Draining);
        info!(consumed, "consumer stopped");
        self.set_state(PipelineState::Stopped);

        consumed
    }

    /// Replays the stream between the option bounds without a consumer
    /// group. Nothing is acknowledged.
    pub fn iterate(
        &self,
        options: IterationOptions,
    ) -> impl Stream<Item = Result<Announcement, Error>> + Send + '_ {
        let token = self.plan.cancellation.clone();

        stream! {
            let mut from = options.from.map_or(EntryId::ZERO, EntryId::from_time);
            let to = options.to.map_or(EntryId::MAX, EntryId::until_time);
            let page_size = options.page_size.max(1);
            let mut backoff = self.plan.empty_backoff.clone();
            backoff.reset();

            loop {
                let page = match self.range(&token, from, to, page_size).await {
                    Ok(page) => page,
                    Err(Error::Read { source, .. }) if source.is_cancelled() => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                let Some(last) = page.last().map(|entry| entry.id) else {
                    if options.exit_when_empty || !pause(&token, backoff.next_delay()).await {
                        break;
                    }
                    continue;
                };
                backoff.reset();

                for entry in page {
                    match self.rehydrate(&entry).await {
                        Ok(announcement) if options.accepts(announcement.metadata().operation()) => {
                            yield Ok(announcement);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            yield Err(e);
                        }
                    }
                }

                if last >= to {
                    break;
                }
                from = last.successor();
            }
        }
    }

    fn linked(&self, cancel: &CancellationToken) -> CancellationToken {
        let token = self.plan.cancellation.child_token();

        let linked = token.clone();
        let caller = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = caller.cancelled() => linked.cancel(),
                () = linked.cancelled() => {}
            }
        });

        token
    }

    fn set_state(&self, state: PipelineState) {
        self.state.send_replace(state);
    }

    /// Creates the group, retrying until the stream exists. Returns `false`
    /// if cancelled first.
    async fn ensure_group(&self, token: &CancellationToken) -> bool {
        let mut backoff = EmptyBackoff::new(Duration::from_millis(100), Duration::from_secs(5));

        loop {
            let result = self
                .plan
                .policy
                .execute_until_cancelled("create_group", token, || async {
                    self.plan
                        .supervisor
                        .acquire()
                        .await?
                        .create_group(&self.stream, &self.plan.consumer_group, self.plan.group_start)
                        .await
                })
                .await;

            match result {
                Ok(()) => return true,
                Err(e) if e.is_cancelled() => return false,
                Err(e) => {
                    let delay = backoff.next_delay();
                    if matches!(
                        e.inner(),
                        Some(proven_log_store::Error::StreamNotFound(_))
                    ) {
                        debug!(?delay, "stream not created yet, waiting");
                    } else {
                        warn!(?delay, error = %e, "failed to create consumer group");
                    }

                    if !pause(token, delay).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn consume(&self, token: &CancellationToken) -> u64 {
        let mut backoff = self.plan.empty_backoff.clone();
        backoff.reset();
        let mut consumed = 0_u64;
        let mut empty_reads = 0_u32;

        loop {
            if token.is_cancelled() {
                break;
            }

            let Some(budget) = self.budget(consumed) else {
                info!(consumed, "message limit reached, detaching");
                break;
            };

            if let Some(remaining) = self.plan.policy.breaker().remaining_open() {
                warn!(?remaining, "circuit open, pausing reads");
                if !pause(token, remaining).await {
                    break;
                }
                continue;
            }

            self.set_state(PipelineState::BatchRead);

            let entries = match self.read(token, budget).await {
                Ok(entries) => entries,
                Err(Error::Read { source, .. }) if source.is_cancelled() => break,
                Err(e) => {
                    warn!(error = %e, "read failed");
                    self.set_state(PipelineState::EmptyBackoff);
                    if !pause(token, backoff.next_delay()).await {
                        break;
                    }
                    continue;
                }
            };

            if entries.is_empty() {
                empty_reads += 1;

                if empty_reads >= self.plan.stale_claim.after_empty_reads {
                    empty_reads = 0;

                    let claimed = self.claim_stale(token, budget).await;
                    if !claimed.is_empty() {
                        backoff.reset();
                        let outcome = self.process(claimed).await;
                        consumed += outcome.processed;
                        if outcome.reached_until {
                            break;
                        }
                        continue;
                    }
                }

                if self.plan.until.is_some_and(|until| Utc::now() > until) {
                    info!(consumed, "caught up past upper time bound, stopping");
                    break;
                }

                self.set_state(PipelineState::EmptyBackoff);
                if !pause(token, backoff.next_delay()).await {
                    break;
                }
                continue;
            }

            empty_reads = 0;
            backoff.reset();

            let outcome = self.process(entries).await;
            consumed += outcome.processed;
            if outcome.reached_until {
                break;
            }
        }

        consumed
    }

    /// Entries that may still be read, or `None` once the limit is reached.
    fn budget(&self, consumed: u64) -> Option<usize> {
        match self.plan.max_messages {
            None => Some(self.plan.batch_size),
            Some(max) if consumed >= max => None,
            Some(max) => Some(
                usize::try_from(max - consumed).map_or(self.plan.batch_size, |left| {
                    left.min(self.plan.batch_size)
                }),
            ),
        }
    }

    async fn read(&self, token: &CancellationToken, count: usize) -> Result<Vec<StreamEntry>, Error> {
        self.plan
            .policy
            .execute_until_cancelled("read_group", token, || async {
                self.plan
                    .supervisor
                    .acquire()
                    .await?
                    .read_group(
                        &self.stream,
                        &self.plan.consumer_group,
                        &self.plan.consumer_name,
                        count,
                    )
                    .await
            })
            .await
            .map_err(|source| Error::Read {
                stream: self.stream.clone(),
                source,
            })
    }

    async fn range(
        &self,
        token: &CancellationToken,
        from: EntryId,
        to: EntryId,
        count: usize,
    ) -> Result<Vec<StreamEntry>, Error> {
        self.plan
            .policy
            .execute_until_cancelled("range", token, || async {
                self.plan
                    .supervisor
                    .acquire()
                    .await?
                    .range(&self.stream, from, to, count)
                    .await
            })
            .await
            .map_err(|source| Error::Read {
                stream: self.stream.clone(),
                source,
            })
    }

    async fn claim_stale(&self, token: &CancellationToken, budget: usize) -> Vec<StreamEntry> {
        self.set_state(PipelineState::StaleClaim);

        let options = &self.plan.stale_claim;
        let count = options.count.min(budget);
        let result = self
            .plan
            .policy
            .execute_until_cancelled("claim_stale", token, || async {
                self.plan
                    .supervisor
                    .acquire()
                    .await?
                    .claim_stale(
                        &self.stream,
                        &self.plan.consumer_group,
                        &self.plan.consumer_name,
                        options.min_idle,
                        count,
                    )
                    .await
            })
            .await;

        match result {
            Ok(entries) => {
                if !entries.is_empty() {
                    info!(
                        claimed = entries.len(),
                        min_idle = ?options.min_idle,
                        "reclaimed stale pending entries"
                    );
                    ConsumerMetrics::get()
                        .claimed
                        .with_label_values(&[self.stream.as_str()])
                        .inc_by(entries.len() as u64);
                }
                entries
            }
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(error = %e, "stale claim failed");
                }
                Vec::new()
            }
        }
    }

    /// Dispatches a batch and waits until every entry in it is resolved.
    async fn process(&self, entries: Vec<StreamEntry>) -> BatchOutcome {
        let (due, beyond): (Vec<_>, Vec<_>) = match self.plan.until.map(EntryId::until_time) {
            Some(bound) => entries.into_iter().partition(|entry| entry.id <= bound),
            None => (entries, Vec::new()),
        };

        if let Some(first) = beyond.first() {
            info!(
                id = %first.id,
                left_pending = beyond.len(),
                "entry past upper time bound, stopping"
            );
        }

        let processed = due.len() as u64;
        futures::stream::iter(due)
            .for_each_concurrent(self.plan.max_parallelism, |entry| self.deliver(entry))
            .await;

        BatchOutcome {
            processed,
            reached_until: !beyond.is_empty(),
        }
    }

    async fn deliver(&self, entry: StreamEntry) {
        let ack = AckHandle::new(entry.id, self.stream.clone(), self.acknowledger.clone());

        let announcement = match self.rehydrate(&entry).await {
            Ok(announcement) => announcement,
            Err(e) => {
                error!(id = %entry.id, error = %e, "failed to rebuild announcement");
                ack.cancel("undecodable");
                return;
            }
        };

        let metadata = announcement.metadata();
        if !metadata.origin().intersects(self.plan.origin_filter)
            || !self.plan.accepts_operation(metadata.operation())
        {
            debug!(id = %entry.id, operation = metadata.operation(), "skipping filtered announcement");
            if let Err(e) = ack.ack("filtered").await {
                warn!(id = %entry.id, error = %e, "failed to acknowledge filtered announcement");
            }
            return;
        }

        for interceptor in &self.plan.interceptors {
            interceptor.on_received(
                metadata,
                announcement.interceptors_data().get(interceptor.name()),
            );
        }

        let metrics = ConsumerMetrics::get();
        metrics
            .consumed
            .with_label_values(&[self.stream.as_str()])
            .inc();

        let operation = metadata.operation().to_string();
        let outcome = self
            .registry
            .dispatch(
                announcement,
                ack,
                self.plan.ack_behavior,
                self.plan.handler_timeout,
            )
            .await;

        if matches!(outcome, Dispatch::Failed | Dispatch::TimedOut) {
            metrics
                .handler_failures
                .with_label_values(&[self.stream.as_str(), operation.as_str()])
                .inc();
        }
    }

    /// Rebuilds an announcement from an entry, loading every category the
    /// producer flagged as stored.
    async fn rehydrate(&self, entry: &StreamEntry) -> Result<Announcement, Error> {
        let metadata = wire::decode_metadata(&entry.fields)?.with_event_key(entry.id.to_string());
        let mut announcement = Announcement::new(metadata);

        for category in BucketCategory::ALL {
            let bucket = self
                .plan
                .storage
                .load(
                    announcement.metadata(),
                    announcement.bucket(category),
                    category,
                    entry,
                )
                .await?;
            announcement = announcement.with_bucket(category, bucket);
        }

        Ok(announcement)
    }
}

/// Sleeps for `delay` unless `token` fires first. Returns whether the full
/// delay elapsed.
async fn pause(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = token.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
