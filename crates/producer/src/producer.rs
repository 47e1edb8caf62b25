use proven_announcement::{Announcement, Bucket, Metadata, MessageOrigin, wire};
use proven_log_store::{Connector, EntryId, LogConnection};
use tracing::{debug, error, instrument};

use crate::error::Error;
use crate::metrics::ProducerMetrics;
use crate::plan::{Invocation, ProducerPlan};
use crate::segmentation::segment_arguments;

/// Publishes announcements to the stream a plan targets.
#[derive(Clone, Debug)]
pub struct Producer<C>
where
    C: Connector,
{
    plan: ProducerPlan<C>,
}

impl<C> Producer<C>
where
    C: Connector,
{
    /// Creates a producer for `plan`.
    pub const fn new(plan: ProducerPlan<C>) -> Self {
        Self { plan }
    }

    /// The plan in use.
    pub const fn plan(&self) -> &ProducerPlan<C> {
        &self.plan
    }

    /// Builds an announcement from `invocation`, offloads its buckets and
    /// appends it.
    ///
    /// Returns the store-assigned id, or [`EntryId::ZERO`] if the store did
    /// not report one.
    ///
    /// # Errors
    ///
    /// Storage and append failures are logged and returned; nothing is
    /// dropped silently.
    #[instrument(
        skip(self, invocation),
        fields(operation = invocation.operation(), version = invocation.version())
    )]
    pub async fn send(&self, invocation: Invocation) -> Result<EntryId, Error> {
        let mut metadata = Metadata::new(invocation.operation(), invocation.version())
            .with_params_signature(invocation.params_signature())
            .with_environment(self.plan.environment.clone())
            .with_uri(self.plan.uri.clone())
            .with_channel_type(self.plan.channel_type.clone());
        if let Some(message_id) = invocation.message_id() {
            metadata = metadata.with_message_id(message_id);
        }

        let segments = segment_arguments(
            &self.plan.segmentation,
            invocation.operation(),
            invocation.arguments(),
        );
        let interceptors_data = self.intercept(&metadata);

        let announcement = Announcement::new(metadata)
            .with_segments(segments)
            .with_interceptors_data(interceptors_data);

        self.publish(announcement).await
    }

    /// Re-publishes an announcement into this producer's stream, keeping its
    /// id and payload and marking it as a copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForwardLoop`] if the announcement is already a copy,
    /// otherwise as [`Self::send`].
    #[instrument(
        skip(self, announcement),
        fields(message_id = announcement.metadata().message_id())
    )]
    pub async fn forward(&self, announcement: &Announcement) -> Result<EntryId, Error> {
        let source = announcement.metadata();
        if source.origin().is_copy() {
            return Err(Error::ForwardLoop {
                message_id: source.message_id().to_string(),
            });
        }

        let metadata = source
            .clone()
            .with_environment(self.plan.environment.clone())
            .with_uri(self.plan.uri.clone())
            .with_origin(MessageOrigin::COPY);

        self.publish(announcement.clone().with_metadata(metadata))
            .await
    }

    fn intercept(&self, metadata: &Metadata) -> Bucket {
        self.plan
            .interceptors
            .iter()
            .filter_map(|interceptor| {
                interceptor
                    .intercept(metadata)
                    .map(|data| (interceptor.name().to_string(), data))
            })
            .collect()
    }

    async fn publish(&self, announcement: Announcement) -> Result<EntryId, Error> {
        let metadata = announcement
            .metadata()
            .clone()
            .with_storage_types(announcement.present_categories());
        let stream = metadata.full_uri();
        let operation = metadata.operation().to_string();

        let mut fields = wire::encode_metadata(&metadata)?;

        for category in metadata.storage_types().categories() {
            let located = self
                .plan
                .storage
                .save(
                    metadata.message_id(),
                    announcement.bucket(category),
                    category,
                    &metadata,
                )
                .await
                .inspect_err(|e| {
                    error!(%stream, %operation, %category, error = ?e, "failed to store bucket");
                })?;
            fields.extend(located);
        }

        let metrics = ProducerMetrics::get();
        let appended = self
            .plan
            .policy
            .execute("append", || async {
                self.plan
                    .supervisor
                    .acquire()
                    .await?
                    .append(&stream, fields.clone())
                    .await
            })
            .await;

        match appended {
            Ok(id) => {
                metrics
                    .appended
                    .with_label_values(&[stream.as_str(), operation.as_str()])
                    .inc();
                let id = id.unwrap_or(EntryId::ZERO);
                debug!(%stream, %operation, %id, "announcement appended");
                Ok(id)
            }
            Err(e) => {
                metrics
                    .append_failures
                    .with_label_values(&[stream.as_str(), operation.as_str()])
                    .inc();
                error!(%stream, %operation, error = ?e, "failed to append announcement");
                Err(Error::Append { stream, source: e })
            }
        }
    }
}
