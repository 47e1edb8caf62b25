use bytes::Bytes;
use proven_log_store::StreamEntry;

/// Read access to the raw fields of the entry being rehydrated.
pub trait PropertyLookup: Send + Sync {
    /// Value of the field named `name`.
    fn property(&self, name: &str) -> Option<Bytes>;
}

impl PropertyLookup for StreamEntry {
    fn property(&self, name: &str) -> Option<Bytes> {
        self.field(name).cloned()
    }
}

impl PropertyLookup for [(String, Bytes)] {
    fn property(&self, name: &str) -> Option<Bytes> {
        self.iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.clone())
    }
}

impl PropertyLookup for Vec<(String, Bytes)> {
    fn property(&self, name: &str) -> Option<Bytes> {
        self.as_slice().property(name)
    }
}
