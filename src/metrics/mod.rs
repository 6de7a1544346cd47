//! Telemetry counters for the resolution pipeline.
//!
//! [`MetricsCollector`] is a passive observer: components call the `record_*`
//! methods as events happen and [`MetricsCollector::snapshot`] recomputes a
//! [`MetricsSnapshot`] on demand from the running counters. Every update is
//! a handful of relaxed atomic increments, so recording is safe from any
//! task and never contends with the pipeline's own locks. A reader may see a
//! snapshot that is a few events stale; this is telemetry, not a
//! correctness-critical path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Resolutions served from the cache.
    pub hits: u64,
    /// Resolutions that had to consult the coordinator/resolver.
    pub misses: u64,
    /// Callers attached to an already in-flight upstream call.
    pub deduped_requests: u64,
    /// Failed boundary resolutions, one increment per failure.
    pub errors: u64,
    /// All boundary resolution attempts, successful or not.
    pub total_requests: u64,
    /// Entries currently live in the resolution cache.
    pub cache_size: u64,
    /// Mean upstream response time across successful lookups, in milliseconds.
    pub avg_response_time_ms: f64,
}

/// Additive counters plus an O(1) running mean for response time.
///
/// The mean is kept as a (total millis, sample count) pair of atomics rather
/// than a stored average, so each observation is a single add and the mean
/// is derived at snapshot time.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    deduped: AtomicU64,
    errors: AtomicU64,
    total: AtomicU64,
    response_time_total_ms: AtomicU64,
    response_time_samples: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A boundary resolution began (counted whether or not it succeeds).
    pub fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// A resolution was served from the cache.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A resolution missed the cache.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller was coalesced onto an existing in-flight upstream call.
    pub fn record_deduped(&self) {
        self.deduped.fetch_add(1, Ordering::Relaxed);
    }

    /// A boundary resolution failed.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A successful upstream lookup took `millis` from first attempt to success.
    pub fn record_response_time(&self, millis: u64) {
        self.response_time_total_ms.fetch_add(millis, Ordering::Relaxed);
        self.response_time_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Builds a snapshot from the current counters.
    ///
    /// `cache_size` is owned by the cache, not this collector, so the caller
    /// supplies it.
    pub fn snapshot(&self, cache_size: u64) -> MetricsSnapshot {
        let samples = self.response_time_samples.load(Ordering::Relaxed);
        let total_ms = self.response_time_total_ms.load(Ordering::Relaxed);
        let avg_response_time_ms = if samples == 0 {
            0.0
        } else {
            total_ms as f64 / samples as f64
        };

        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            deduped_requests: self.deduped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_requests: self.total.load(Ordering::Relaxed),
            cache_size,
            avg_response_time_ms,
        }
    }

    /// Zeroes every counter. Used by the engine's test-isolation reset.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.deduped.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
        self.response_time_total_ms.store(0, Ordering::Relaxed);
        self.response_time_samples.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = MetricsCollector::new();
        m.record_request();
        m.record_request();
        m.record_hit();
        m.record_miss();
        m.record_deduped();
        m.record_error();

        let snap = m.snapshot(3);
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.deduped_requests, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.cache_size, 3);
    }

    #[test]
    fn average_response_time_over_samples() {
        let m = MetricsCollector::new();
        m.record_response_time(100);
        m.record_response_time(300);
        let snap = m.snapshot(0);
        assert_eq!(snap.avg_response_time_ms, 200.0);
    }

    #[test]
    fn average_is_zero_without_samples() {
        let m = MetricsCollector::new();
        assert_eq!(m.snapshot(0).avg_response_time_ms, 0.0);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let m = MetricsCollector::new();
        m.record_request();
        m.record_hit();
        m.record_response_time(120);

        let json = serde_json::to_value(m.snapshot(1)).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["cache_size"], 1);
        assert_eq!(json["avg_response_time_ms"], 120.0);
    }

    #[test]
    fn reset_zeroes_everything() {
        let m = MetricsCollector::new();
        m.record_request();
        m.record_hit();
        m.record_response_time(50);
        m.reset();

        let snap = m.snapshot(0);
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.avg_response_time_ms, 0.0);
    }
}
