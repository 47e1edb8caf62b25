use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Error;

/// Store-assigned position of an entry: `<millis>-<seq>`.
///
/// Ids are totally ordered and strictly increase within one stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    /// Milliseconds since the unix epoch.
    pub millis: u64,

    /// Sequence within the millisecond.
    pub seq: u64,
}

impl EntryId {
    /// Returned when the store does not report an id.
    pub const ZERO: Self = Self { millis: 0, seq: 0 };

    /// Largest possible id.
    pub const MAX: Self = Self {
        millis: u64::MAX,
        seq: u64::MAX,
    };

    /// Creates an id.
    #[must_use]
    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Lowest id at or after `time`.
    #[must_use]
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self::new(u64::try_from(time.timestamp_millis()).unwrap_or(0), 0)
    }

    /// Highest id at or before `time`.
    #[must_use]
    pub fn until_time(time: DateTime<Utc>) -> Self {
        Self::new(u64::try_from(time.timestamp_millis()).unwrap_or(0), u64::MAX)
    }

    /// Whether this is the zero sentinel.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.millis == 0 && self.seq == 0
    }

    /// The smallest id strictly greater than this one.
    #[must_use]
    pub const fn successor(self) -> Self {
        if self.seq == u64::MAX {
            Self::new(self.millis.saturating_add(1), 0)
        } else {
            Self::new(self.millis, self.seq + 1)
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Backend(format!("invalid entry id: {s}"));

        let (millis, seq) = s.split_once('-').ok_or_else(invalid)?;

        Ok(Self {
            millis: millis.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

/// One entry read back from a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEntry {
    /// Position in the stream.
    pub id: EntryId,

    /// Field/value pairs in append order.
    pub fields: Vec<(String, Bytes)>,
}

impl StreamEntry {
    /// Value of the first field named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Bytes> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// Where a newly created consumer group starts reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupStart {
    /// Deliver every entry already in the stream.
    #[default]
    Beginning,

    /// Deliver only entries appended after creation.
    Latest,
}
