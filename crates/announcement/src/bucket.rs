use std::collections::BTreeMap;
use std::collections::btree_map;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An ordered mapping of segment name to raw bytes.
///
/// Buckets are values: every operation returns a new bucket and leaves the
/// receiver untouched. Merging is first-write-wins, which lets a chain of
/// storage backends layer results without a later backend clobbering an
/// earlier one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bucket {
    entries: BTreeMap<String, Bytes>,
}

impl Bucket {
    /// Creates an empty bucket.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns a copy of this bucket with `key` set to `value`.
    #[must_use]
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Bytes>,
    {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Gets the bytes stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bucket holds no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Segment names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Segments in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Bytes> {
        self.entries.iter()
    }

    /// Merges `other` into a copy of this bucket. Keys already present here
    /// keep their value.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (key, value) in &other.entries {
            entries
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Self { entries }
    }

    /// Returns the segments whose key satisfies `predicate`.
    #[must_use]
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(key, _)| predicate(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Bucket
where
    K: Into<String>,
    V: Into<Bytes>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Bucket {
    type Item = (&'a String, &'a Bytes);
    type IntoIter = btree_map::Iter<'a, String, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Bucket {
    type Item = (String, Bytes);
    type IntoIter = btree_map::IntoIter<String, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_existing_values() {
        let first = Bucket::new().with("x", "b1").with("y", "y1");
        let second = Bucket::new().with("x", "b2").with("z", "z2");

        let merged = first.merge(&second);

        assert_eq!(merged.get("x"), Some(&Bytes::from("b1")));
        assert_eq!(merged.get("y"), Some(&Bytes::from("y1")));
        assert_eq!(merged.get("z"), Some(&Bytes::from("z2")));
        assert_eq!(merged.len(), 3);

        // Receiver untouched
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_filter() {
        let bucket = Bucket::new()
            .with("user.email", "a@b.c")
            .with("user.id", "42")
            .with("order", "7");

        let personal = bucket.filter(|key| key.starts_with("user."));

        assert_eq!(personal.keys().collect::<Vec<_>>(), vec!["user.email", "user.id"]);
    }

    #[test]
    fn test_keys_are_ordered() {
        let bucket: Bucket = [("b", "2"), ("a", "1"), ("c", "3")].into_iter().collect();

        assert_eq!(bucket.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
