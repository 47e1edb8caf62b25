use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use proven_log_store::Connector;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::error::Error;
use crate::handler::HandlerRegistry;
use crate::pipeline::{ConsumerPipeline, PipelineState};
use crate::plan::ConsumerPlan;

/// Runs a [`ConsumerPipeline`] in the background.
pub struct Consumer<C>
where
    C: Connector,
{
    consumed: Arc<AtomicU64>,
    pipeline: Arc<ConsumerPipeline<C>>,
    shutdown_token: CancellationToken,
    started: AtomicBool,
    task_tracker: TaskTracker,
}

impl<C> Consumer<C>
where
    C: Connector,
{
    /// Creates a stopped consumer.
    pub fn new(plan: ConsumerPlan<C>, registry: HandlerRegistry) -> Self {
        Self {
            consumed: Arc::new(AtomicU64::new(0)),
            pipeline: Arc::new(ConsumerPipeline::new(plan, registry)),
            shutdown_token: CancellationToken::new(),
            started: AtomicBool::new(false),
            task_tracker: TaskTracker::new(),
        }
    }

    /// The pipeline driven by this consumer.
    pub fn pipeline(&self) -> &Arc<ConsumerPipeline<C>> {
        &self.pipeline
    }

    /// Receiver following the pipeline state.
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.pipeline.state()
    }

    /// Entries processed so far by a finished run.
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    /// Spawns the consume loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] on the second call.
    pub fn start(&self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let pipeline = self.pipeline.clone();
        let shutdown_token = self.shutdown_token.clone();
        let consumed = self.consumed.clone();

        self.task_tracker.spawn(async move {
            let count = pipeline.run(&shutdown_token).await;
            consumed.store(count, Ordering::Release);
        });
        self.task_tracker.close();

        Ok(())
    }

    /// Asks the loop to stop after the batch in flight.
    pub fn shutdown(&self) {
        info!(stream = %self.pipeline.plan().full_uri(), "consumer shutting down");
        self.shutdown_token.cancel();
        self.task_tracker.close();
    }

    /// Waits for the loop to finish.
    pub async fn wait(&self) {
        self.task_tracker.wait().await;
    }
}
