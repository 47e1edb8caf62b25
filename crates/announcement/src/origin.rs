use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Whether an announcement was produced here or forwarded from elsewhere.
    ///
    /// Forwarders mark what they re-publish as [`MessageOrigin::COPY`] so a copy is
    /// never forwarded a second time.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MessageOrigin: u8 {
        /// Produced by the first producer.
        const ORIGINAL = 0b01;
        /// Re-published by a forwarder.
        const COPY = 0b10;
        /// Either origin; used as a filter.
        const ANY = Self::ORIGINAL.bits() | Self::COPY.bits();
    }
}

impl MessageOrigin {
    /// Whether the copy flag is set.
    #[must_use]
    pub const fn is_copy(self) -> bool {
        self.intersects(Self::COPY)
    }
}

impl Default for MessageOrigin {
    fn default() -> Self {
        Self::ORIGINAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_filter() {
        assert!(MessageOrigin::ORIGINAL.intersects(MessageOrigin::ANY));
        assert!(MessageOrigin::COPY.intersects(MessageOrigin::ANY));
        assert!(!MessageOrigin::COPY.intersects(MessageOrigin::ORIGINAL));
        assert!(MessageOrigin::COPY.is_copy());
        assert!(!MessageOrigin::default().is_copy());
    }
}
