//! Canonical tag sets and series identity hashing
//!
//! A series is identified by its metric name plus its tags. Tags are kept
//! sorted by key so that two observations carrying the same tags in a
//! different order resolve to the same identity.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

/// Separator written between hashed fields (never valid inside UTF-8 text)
const FIELD_SEPARATOR: u8 = 0xFF;

/// An immutable key/value pair
///
/// Keys and values are shared `Arc<str>` handles handed out by the
/// [`TagCache`](super::TagCache), so identical strings across series share
/// one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Tag key
    pub key: Arc<str>,
    /// Tag value
    pub value: Arc<str>,
}

impl Tag {
    /// Create a tag
    pub fn new(key: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether both key and value are non-empty
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty() && !self.value.is_empty()
    }
}

/// Tags ordered ascending by key
///
/// The ordering holds at all times: [`TagSet::add`] inserts at the position
/// found by binary search. Duplicate keys are not merged; callers are
/// expected to pass distinct keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tag set with room for `capacity` tags
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tags: Vec::with_capacity(capacity),
        }
    }

    /// Insert a tag keeping the set sorted by key
    pub fn add(&mut self, tag: Tag) {
        let idx = match self.tags.binary_search_by(|t| t.key.cmp(&tag.key)) {
            Ok(idx) | Err(idx) => idx,
        };
        self.tags.insert(idx, tag);
    }

    /// Look up the value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|t| t.key.as_ref().cmp(key))
            .ok()
            .map(|idx| self.tags[idx].value.as_ref())
    }

    /// Iterate tags in key order
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.tags.iter()
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the set has no tags
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, tag) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", tag.key, tag.value)?;
        }
        f.write_str("}")
    }
}

/// Compute the identity hash of a series
///
/// Hashes the metric name, then each tag key and value in key order, with a
/// `0xFF` byte after every field. A fresh hasher is built on every call so
/// concurrent callers never share hashing state.
pub fn hash_key(metric: &str, tags: &TagSet) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(metric.as_bytes());
    hasher.write_u8(FIELD_SEPARATOR);
    for tag in tags {
        hasher.write(tag.key.as_bytes());
        hasher.write_u8(FIELD_SEPARATOR);
        hasher.write(tag.value.as_bytes());
        hasher.write_u8(FIELD_SEPARATOR);
    }
    hasher.finish()
}
