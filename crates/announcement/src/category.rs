use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// One of the two payload buckets carried by an announcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketCategory {
    /// Business payload.
    Segments,

    /// Side-channel data owned by interceptors.
    Interceptions,
}

impl BucketCategory {
    /// Every category, in processing order.
    pub const ALL: [Self; 2] = [Self::Segments, Self::Interceptions];

    /// The name used in field names and storage keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Segments => "Segments",
            Self::Interceptions => "Interceptions",
        }
    }

    /// The single-category mask.
    #[must_use]
    pub const fn mask(self) -> EventBucketCategories {
        match self {
            Self::Segments => EventBucketCategories::SEGMENTS,
            Self::Interceptions => EventBucketCategories::INTERCEPTIONS,
        }
    }
}

impl Display for BucketCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Segments" => Ok(Self::Segments),
            "Interceptions" => Ok(Self::Interceptions),
            other => Err(other.to_string()),
        }
    }
}

bitflags! {
    /// Bitmask over [`BucketCategory`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EventBucketCategories: u8 {
        /// Business payload only.
        const SEGMENTS = 0b01;
        /// Interceptor data only.
        const INTERCEPTIONS = 0b10;
        /// Both categories.
        const ALL = Self::SEGMENTS.bits() | Self::INTERCEPTIONS.bits();
    }
}

impl EventBucketCategories {
    /// Whether `category` is part of this mask.
    #[must_use]
    pub const fn includes(self, category: BucketCategory) -> bool {
        self.contains(category.mask())
    }

    /// The categories set in this mask.
    pub fn categories(self) -> impl Iterator<Item = BucketCategory> {
        BucketCategory::ALL
            .into_iter()
            .filter(move |category| self.includes(*category))
    }
}

impl Default for EventBucketCategories {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<BucketCategory> for EventBucketCategories {
    fn from(category: BucketCategory) -> Self {
        category.mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_membership() {
        assert!(EventBucketCategories::ALL.includes(BucketCategory::Segments));
        assert!(EventBucketCategories::ALL.includes(BucketCategory::Interceptions));
        assert!(!EventBucketCategories::SEGMENTS.includes(BucketCategory::Interceptions));
        assert!(!EventBucketCategories::empty().includes(BucketCategory::Segments));
        assert_eq!(
            EventBucketCategories::SEGMENTS | EventBucketCategories::INTERCEPTIONS,
            EventBucketCategories::ALL
        );
    }

    #[test]
    fn test_categories_iteration() {
        let all: Vec<_> = EventBucketCategories::ALL.categories().collect();
        assert_eq!(all, vec![BucketCategory::Segments, BucketCategory::Interceptions]);
        assert_eq!(EventBucketCategories::empty().categories().count(), 0);
    }

    #[test]
    fn test_unknown_bits_are_dropped() {
        assert_eq!(
            EventBucketCategories::from_bits_truncate(0b111),
            EventBucketCategories::ALL
        );
        assert_eq!(EventBucketCategories::from_bits(0b100), None);
    }

    #[test]
    fn test_mask_serde_round_trip() {
        let json = serde_json::to_string(&EventBucketCategories::ALL).unwrap();
        let decoded: EventBucketCategories = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, EventBucketCategories::ALL);
    }
}
