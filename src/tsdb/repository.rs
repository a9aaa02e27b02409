//! Series store
//!
//! A keyed table from identity hash to shared [`TimeSeries`]. One coarse
//! `RwLock` guards the table; lookups take the shared lock and creation
//! takes the exclusive lock. Sinks are locked independently, so holding a
//! series reference never blocks the table.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::TimeSeries;
use crate::error::StoreError;

/// Storage seam for aggregated series
pub trait Repository: Send + Sync {
    /// Look up a series by identity
    fn get_series_by_id(&self, id: u64) -> Option<Arc<TimeSeries>>;

    /// Insert a new series
    ///
    /// Fails with [`StoreError::AlreadyExists`] when the identity is taken.
    fn insert_series(&self, series: Arc<TimeSeries>) -> Result<(), StoreError>;

    /// Snapshot of every stored series
    fn get_series(&self) -> Vec<Arc<TimeSeries>>;

    /// Return the series for `id`, creating it with `make` when absent
    ///
    /// The flag is `true` when this call inserted the series. Concurrent
    /// callers racing on the same identity all receive the same `Arc`;
    /// `make` may run in more than one of them but only one result is kept.
    fn get_or_insert_with(
        &self,
        id: u64,
        make: &mut dyn FnMut() -> TimeSeries,
    ) -> (Arc<TimeSeries>, bool);

    /// Number of stored series
    fn len(&self) -> usize;

    /// Whether the store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded in-memory repository
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    series: RwLock<HashMap<u64, Arc<TimeSeries>>>,
}

impl InMemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with room for `capacity` series
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }
}

impl Repository for InMemoryRepository {
    fn get_series_by_id(&self, id: u64) -> Option<Arc<TimeSeries>> {
        self.series.read().get(&id).cloned()
    }

    fn insert_series(&self, series: Arc<TimeSeries>) -> Result<(), StoreError> {
        let mut table = self.series.write();
        if table.contains_key(&series.id) {
            return Err(StoreError::AlreadyExists(series.id));
        }
        table.insert(series.id, series);
        Ok(())
    }

    fn get_series(&self) -> Vec<Arc<TimeSeries>> {
        self.series.read().values().cloned().collect()
    }

    fn get_or_insert_with(
        &self,
        id: u64,
        make: &mut dyn FnMut() -> TimeSeries,
    ) -> (Arc<TimeSeries>, bool) {
        // Fast path: shared lock only
        if let Some(existing) = self.series.read().get(&id) {
            return (Arc::clone(existing), false);
        }

        // Build outside the exclusive lock
        let candidate = Arc::new(make());

        // Double-check after acquiring the write lock
        let mut table = self.series.write();
        match table.entry(id) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => (Arc::clone(entry.insert(candidate)), true),
        }
    }

    fn len(&self) -> usize {
        self.series.read().len()
    }
}
