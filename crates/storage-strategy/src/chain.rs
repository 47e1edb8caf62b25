use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use proven_announcement::wire::location_field;
use proven_announcement::{Bucket, BucketCategory, EventBucketCategories, Metadata};
use tracing::{debug, instrument};

use crate::StorageStrategy;
use crate::error::Error;
use crate::lookup::PropertyLookup;

/// Selects which bucket keys a strategy may touch.
pub type KeyFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A strategy plus the categories and keys it applies to.
#[derive(Clone)]
pub struct StrategyRegistration {
    categories: EventBucketCategories,
    key_filter: Option<KeyFilter>,
    strategy: Arc<dyn StorageStrategy>,
}

impl StrategyRegistration {
    /// Applies `strategy` to every key of the given categories.
    pub fn new(strategy: Arc<dyn StorageStrategy>, categories: EventBucketCategories) -> Self {
        Self {
            categories,
            key_filter: None,
            strategy,
        }
    }

    /// Restricts the strategy to keys accepted by `filter`.
    #[must_use]
    pub fn with_key_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.key_filter = Some(Arc::new(filter));
        self
    }

    /// Categories this registration applies to.
    #[must_use]
    pub const fn categories(&self) -> EventBucketCategories {
        self.categories
    }

    /// The registered strategy.
    #[must_use]
    pub fn strategy(&self) -> &Arc<dyn StorageStrategy> {
        &self.strategy
    }

    fn applies_to(&self, category: BucketCategory) -> bool {
        self.categories.includes(category)
    }

    fn accepts(&self, key: &str) -> bool {
        self.key_filter.as_ref().is_none_or(|filter| filter(key))
    }

    fn select(&self, bucket: &Bucket) -> Bucket {
        bucket.filter(|key| self.accepts(key))
    }
}

impl fmt::Debug for StrategyRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistration")
            .field("categories", &self.categories)
            .field("key_filter", &self.key_filter.is_some())
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Ordered storage strategies with a default for whatever they leave behind.
///
/// On save every registration matching the category stores the keys its
/// filter accepts. Keys accepted by no registration go to the default
/// strategy. On load registrations run in the same order and the results are
/// merged first-write-wins, so earlier registrations shadow later ones.
#[derive(Clone, Debug)]
pub struct StrategyChain {
    default: Arc<dyn StorageStrategy>,
    registrations: Vec<StrategyRegistration>,
}

impl StrategyChain {
    /// A chain that stores everything with `default`.
    pub fn new(default: Arc<dyn StorageStrategy>) -> Self {
        Self {
            default,
            registrations: Vec::new(),
        }
    }

    /// Appends a registration.
    #[must_use]
    pub fn with_strategy(mut self, registration: StrategyRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// The default strategy.
    #[must_use]
    pub fn default_strategy(&self) -> &Arc<dyn StorageStrategy> {
        &self.default
    }

    /// Registrations in order.
    #[must_use]
    pub fn registrations(&self) -> &[StrategyRegistration] {
        &self.registrations
    }

    /// Stores `bucket` and returns the location fields to embed in the entry.
    ///
    /// # Errors
    ///
    /// Returns the first strategy failure. Earlier strategies may already
    /// have written.
    #[instrument(skip(self, bucket, metadata), fields(category = %category, keys = bucket.len()))]
    pub async fn save(
        &self,
        id: &str,
        bucket: &Bucket,
        category: BucketCategory,
        metadata: &Metadata,
    ) -> Result<Vec<(String, Bytes)>, Error> {
        let mut fields = Vec::new();
        let mut leftover = bucket.clone();

        for registration in self.matching(category) {
            let selected = registration.select(bucket);
            if selected.is_empty() {
                continue;
            }

            let strategy = registration.strategy();
            if let Some(pointer) = strategy.save(id, &selected, category, metadata).await? {
                fields.push((location_field(strategy.provider_id(), category), pointer));
            }

            leftover = leftover.filter(|key| !selected.contains_key(key));
        }

        if !leftover.is_empty() {
            debug!(
                provider = self.default.provider_id(),
                keys = leftover.len(),
                "storing remaining keys with default strategy"
            );

            if let Some(pointer) = self.default.save(id, &leftover, category, metadata).await? {
                fields.push((location_field(self.default.provider_id(), category), pointer));
            }
        }

        Ok(fields)
    }

    /// Rehydrates `category` into `current`.
    ///
    /// Categories not flagged in the metadata's storage types are returned
    /// untouched without any fetch. Values already present in `current` are
    /// never overwritten.
    ///
    /// # Errors
    ///
    /// Returns the first strategy failure.
    #[instrument(skip(self, metadata, current, lookup), fields(category = %category))]
    pub async fn load(
        &self,
        metadata: &Metadata,
        current: &Bucket,
        category: BucketCategory,
        lookup: &dyn PropertyLookup,
    ) -> Result<Bucket, Error> {
        if !metadata.storage_types().includes(category) {
            return Ok(current.clone());
        }

        let mut merged = current.clone();

        for registration in self.matching(category) {
            let strategy = registration.strategy();
            let Some(pointer) = lookup.property(&location_field(strategy.provider_id(), category))
            else {
                continue;
            };

            let loaded = strategy.load(metadata, category, &pointer).await?;
            merged = merged.merge(&registration.select(&loaded));
        }

        if let Some(pointer) =
            lookup.property(&location_field(self.default.provider_id(), category))
        {
            let loaded = self.default.load(metadata, category, &pointer).await?;
            merged = merged.merge(&loaded);
        }

        Ok(merged)
    }

    fn matching(&self, category: BucketCategory) -> impl Iterator<Item = &StrategyRegistration> {
        self.registrations
            .iter()
            .filter(move |registration| registration.applies_to(category))
    }
}
