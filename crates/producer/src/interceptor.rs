use bytes::Bytes;
use proven_announcement::Metadata;

/// Pre-append hook attaching opaque side-channel data, such as trace
/// context or credentials, to outgoing announcements.
///
/// Output is stored in the interceptors bucket under [`Self::name`].
pub trait ProducerInterceptor: Send + Sync {
    /// Key in the interceptors bucket.
    fn name(&self) -> &str;

    /// Data to attach, or `None` to attach nothing.
    fn intercept(&self, metadata: &Metadata) -> Option<Bytes>;
}
