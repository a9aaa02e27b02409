//! Interning cache for tag keys and values
//!
//! Load tests emit the same handful of tag strings millions of times. The
//! cache hands out one shared `Arc<str>` per distinct string so every
//! [`Tag`](super::Tag) built from it points at the same allocation.
//!
//! # Thread Safety
//!
//! Backed by a `DashMap`, so lookups and inserts on different shards never
//! contend. The cache is owned by a pipeline instance; there is no
//! process-wide table.

use std::sync::Arc;

use dashmap::DashMap;

use super::tags::Tag;

/// Thread-safe string interning cache
#[derive(Debug, Default)]
pub struct TagCache {
    strings: DashMap<Arc<str>, ()>,
}

impl TagCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared handle for `s`, inserting it on first use
    pub fn intern(&self, s: &str) -> Arc<str> {
        // Fast path: already interned
        if let Some(entry) = self.strings.get(s) {
            return Arc::clone(entry.key());
        }

        // Slow path: the entry API re-checks under the shard lock
        let candidate: Arc<str> = Arc::from(s);
        let entry = self.strings.entry(candidate).or_insert(());
        Arc::clone(entry.key())
    }

    /// Build a tag from interned key and value
    pub fn tag(&self, key: &str, value: &str) -> Tag {
        Tag {
            key: self.intern(key),
            value: self.intern(value),
        }
    }

    /// Number of distinct strings held
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_intern_returns_same_allocation() {
        let cache = TagCache::new();
        let a = cache.intern("method");
        let b = cache.intern("method");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_tag_shares_strings() {
        let cache = TagCache::new();
        let first = cache.tag("status", "200");
        let second = cache.tag("status", "200");

        assert!(Arc::ptr_eq(&first.key, &second.key));
        assert!(Arc::ptr_eq(&first.value, &second.value));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_intern() {
        let cache = Arc::new(TagCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        cache.intern(&format!("value-{}", i % 10));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 10);
    }
}
