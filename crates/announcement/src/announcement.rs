use crate::bucket::Bucket;
use crate::category::{BucketCategory, EventBucketCategories};
use crate::metadata::Metadata;

/// One message envelope: metadata plus the business and interceptor buckets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    metadata: Metadata,
    segments: Bucket,
    interceptors_data: Bucket,
}

impl Announcement {
    /// Creates an announcement with empty buckets.
    #[must_use]
    pub const fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            segments: Bucket::new(),
            interceptors_data: Bucket::new(),
        }
    }

    /// The envelope metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Business payload.
    #[must_use]
    pub const fn segments(&self) -> &Bucket {
        &self.segments
    }

    /// Interceptor side-channel data.
    #[must_use]
    pub const fn interceptors_data(&self) -> &Bucket {
        &self.interceptors_data
    }

    /// The bucket for `category`.
    #[must_use]
    pub const fn bucket(&self, category: BucketCategory) -> &Bucket {
        match category {
            BucketCategory::Segments => &self.segments,
            BucketCategory::Interceptions => &self.interceptors_data,
        }
    }

    /// Categories whose bucket is non-empty.
    #[must_use]
    pub fn present_categories(&self) -> EventBucketCategories {
        BucketCategory::ALL
            .into_iter()
            .filter(|category| !self.bucket(*category).is_empty())
            .fold(EventBucketCategories::empty(), |mask, category| {
                mask | category.mask()
            })
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replaces the business payload.
    #[must_use]
    pub fn with_segments(mut self, segments: Bucket) -> Self {
        self.segments = segments;
        self
    }

    /// Replaces the interceptor data.
    #[must_use]
    pub fn with_interceptors_data(mut self, interceptors_data: Bucket) -> Self {
        self.interceptors_data = interceptors_data;
        self
    }

    /// Replaces the bucket for `category`.
    #[must_use]
    pub fn with_bucket(self, category: BucketCategory, bucket: Bucket) -> Self {
        match category {
            BucketCategory::Segments => self.with_segments(bucket),
            BucketCategory::Interceptions => self.with_interceptors_data(bucket),
        }
    }
}
