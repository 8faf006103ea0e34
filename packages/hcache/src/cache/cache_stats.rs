//! Cache statistics and metrics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::fetch_result::CacheStatus;

/// Counters of fetch outcomes and maintenance work
#[derive(Debug)]
pub struct CacheStats {
    /// Fresh entries served without a network call
    pub hits: AtomicU64,
    /// Responses fetched and committed
    pub stored: AtomicU64,
    /// Stale entries confirmed by the origin
    pub revalidations: AtomicU64,
    /// Responses passed through uncached
    pub no_cache: AtomicU64,
    /// Stale entries served because the origin failed
    pub stale_served: AtomicU64,
    /// Entries removed by eviction or purge
    pub evictions: AtomicU64,
    /// Fetches that ended in an error
    pub errors: AtomicU64,
    /// Cache creation time
    pub created_at: Instant,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub stored: u64,
    pub revalidations: u64,
    pub no_cache: u64,
    pub stale_served: u64,
    pub evictions: u64,
    pub errors: u64,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self {
            hits: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            revalidations: AtomicU64::new(0),
            no_cache: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }
}

impl CacheStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one fetch outcome
    pub fn record(&self, status: CacheStatus) {
        let counter = match status {
            CacheStatus::Hit => &self.hits,
            CacheStatus::Stored => &self.stored,
            CacheStatus::Revalidate => &self.revalidations,
            CacheStatus::NoCache => &self.no_cache,
            CacheStatus::UseStaleDueToError => &self.stale_served,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of fetches answered from disk, stale or fresh
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let snapshot = self.snapshot();
        let local = snapshot.hits + snapshot.revalidations + snapshot.stale_served;
        let total = local + snapshot.stored + snapshot.no_cache + snapshot.errors;
        if total == 0 {
            0.0
        } else {
            local as f64 / total as f64
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            no_cache: self.no_cache.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Get cache age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_by_status() {
        let stats = CacheStats::new();
        stats.record(CacheStatus::Hit);
        stats.record(CacheStatus::Hit);
        stats.record(CacheStatus::Stored);
        stats.record(CacheStatus::UseStaleDueToError);
        stats.record_eviction();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.stored, 1);
        assert_eq!(snapshot.stale_served, 1);
        assert_eq!(snapshot.evictions, 1);
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_ratio() {
        assert!(CacheStats::new().hit_ratio().abs() < f64::EPSILON);
    }
}
