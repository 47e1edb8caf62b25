use bytes::Bytes;
use proven_announcement::Metadata;

/// Consumer-side counterpart of a producer interceptor.
///
/// Called before dispatch with the bytes the producer interceptor of the same
/// name attached, if any.
pub trait ConsumerInterceptor: Send + Sync {
    /// Key looked up in the announcement's interceptor data.
    fn name(&self) -> &str;

    /// Observes a received announcement.
    fn on_received(&self, metadata: &Metadata, data: Option<&Bytes>);
}
