use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// process-lifetime counters mutated by the pipeline and read by the
/// transport shell. derived values (hit rate, megabytes saved) are computed
/// at read time from a snapshot.
pub struct ProxyStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    bytes_saved: AtomicU64,
    start_time: Mutex<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub bytes_saved: u64,
    pub start_time: DateTime<Utc>,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            bytes_saved: AtomicU64::new(0),
            start_time: Mutex::new(Utc::now()),
        }
    }

    pub fn record_hit(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// failed requests count as requests but as neither hit nor miss.
    pub fn record_failure(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_saved(&self, bytes: u64) {
        self.bytes_saved.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
            start_time: *self.start_time.lock().unwrap(),
        }
    }

    /// zeroes every counter and re-stamps the start time.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.bytes_saved.store(0, Ordering::Relaxed);
        *self.start_time.lock().unwrap() = Utc::now();
    }
}

impl Default for ProxyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ProxyStats::new();
        stats.record_miss();
        stats.record_hit();
        stats.record_hit();
        stats.record_failure();
        stats.add_bytes_saved(1000);
        stats.add_bytes_saved(24);

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 4);
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.bytes_saved, 1024);
    }

    #[test]
    fn reset_zeroes_counters_and_restamps_start_time() {
        let stats = ProxyStats::new();
        stats.record_miss();
        stats.add_bytes_saved(512);
        let before = stats.snapshot().start_time;

        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.cache_hits, 0);
        assert_eq!(snap.cache_misses, 0);
        assert_eq!(snap.bytes_saved, 0);
        assert!(snap.start_time >= before);
    }
}
