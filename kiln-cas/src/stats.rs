//! CAS statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of store statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CasStats {
    /// Total number of get requests
    pub total_gets: u64,

    /// Gets that found the blob
    pub hits: u64,

    /// Gets that did not
    pub misses: u64,

    /// Blobs stored through put or a completed write
    pub total_puts: u64,

    /// Puts refused for exceeding the entry size limit
    pub rejected_puts: u64,

    /// Current number of blobs
    pub entry_count: usize,

    /// Sum of stored blob sizes
    pub total_bytes: u64,

    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
}

/// Thread-safe statistics collector
#[derive(Debug, Default)]
pub struct StatsCollector {
    total_gets: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    total_puts: AtomicU64,
    rejected_puts: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.total_gets.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.total_gets.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.total_puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected_puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Build a snapshot; entry count and size come from the store itself
    pub fn snapshot(&self, entry_count: usize, total_bytes: u64) -> CasStats {
        let total_gets = self.total_gets.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);

        let hit_rate = if total_gets > 0 {
            hits as f64 / total_gets as f64
        } else {
            0.0
        };

        CasStats {
            total_gets,
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            total_puts: self.total_puts.load(Ordering::Relaxed),
            rejected_puts: self.rejected_puts.load(Ordering::Relaxed),
            entry_count,
            total_bytes,
            hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = StatsCollector::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        let snapshot = stats.snapshot(3, 30);
        assert_eq!(snapshot.total_gets, 4);
        assert_eq!(snapshot.hit_rate, 0.75);
        assert_eq!(snapshot.entry_count, 3);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = StatsCollector::new().snapshot(0, 0);
        assert_eq!(snapshot, CasStats::default());
    }
}
