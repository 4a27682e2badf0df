//! In-process cache backed by a sharded concurrent map.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{CacheEntry, CacheError, CacheKey, CacheStats, PutOutcome, RouteCache};

/// Route cache held in memory for the lifetime of the process.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use rundinner_core::{
///     CacheEntry, CacheKey, Coordinate, Distance, KeyMode, MemoryRouteCache, PutOutcome,
///     RouteCache,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = MemoryRouteCache::new();
/// let a = Coordinate::new(0.0, 0.0)?;
/// let b = Coordinate::new(0.0, 0.01)?;
/// let key = CacheKey::new(a, b, KeyMode::Symmetric);
/// let entry = CacheEntry {
///     key,
///     distance: Distance::from_meters(1_500.0),
///     source: "osrm".into(),
///     resolved_at: Utc::now(),
/// };
/// assert_eq!(cache.put(entry)?, PutOutcome::Inserted);
/// assert_eq!(cache.get(&key)?.map(|e| e.distance.meters), Some(1_500.0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryRouteCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryRouteCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RouteCache for MemoryRouteCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, entry: CacheEntry) -> Result<PutOutcome, CacheError> {
        match self.entries.entry(entry.key) {
            Entry::Occupied(_) => Ok(PutOutcome::AlreadyPresent),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(PutOutcome::Inserted)
            }
        }
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for entry in &self.entries {
            stats.entries += 1;
            *stats
                .by_source
                .entry(entry.value().source.clone())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, Distance, KeyMode};
    use chrono::Utc;
    use rstest::{fixture, rstest};
    use std::sync::Arc;
    use std::thread;

    #[fixture]
    fn key() -> CacheKey {
        let a = Coordinate::new(52.52, 13.40).expect("valid");
        let b = Coordinate::new(52.53, 13.41).expect("valid");
        CacheKey::new(a, b, KeyMode::Symmetric)
    }

    fn entry(key: CacheKey, meters: f64, source: &str) -> CacheEntry {
        CacheEntry {
            key,
            distance: Distance::from_meters(meters),
            source: source.to_owned(),
            resolved_at: Utc::now(),
        }
    }

    #[rstest]
    fn first_writer_wins(key: CacheKey) {
        let cache = MemoryRouteCache::new();
        assert_eq!(cache.put(entry(key, 100.0, "a")).ok(), Some(PutOutcome::Inserted));
        assert_eq!(
            cache.put(entry(key, 200.0, "b")).ok(),
            Some(PutOutcome::AlreadyPresent)
        );
        let stored = cache.get(&key).ok().flatten().expect("entry stored");
        assert_eq!(stored.distance.meters, 100.0);
        assert_eq!(stored.source, "a");
    }

    #[rstest]
    fn concurrent_writers_leave_exactly_one_value(key: CacheKey) {
        let cache = Arc::new(MemoryRouteCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.put(entry(key, f64::from(i), "osrm")).ok())
            })
            .collect();
        let inserted = handles
            .into_iter()
            .filter_map(|handle| handle.join().ok().flatten())
            .filter(|outcome| *outcome == PutOutcome::Inserted)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    fn stats_count_by_source(key: CacheKey) {
        let cache = MemoryRouteCache::new();
        let other = CacheKey::new(
            Coordinate::new(1.0, 1.0).expect("valid"),
            Coordinate::new(2.0, 2.0).expect("valid"),
            KeyMode::Symmetric,
        );
        cache.put(entry(key, 1.0, "osrm")).expect("put");
        cache.put(entry(other, 2.0, "openrouteservice")).expect("put");
        let stats = cache.stats().expect("stats");
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.by_source.get("osrm"), Some(&1));
    }
}
