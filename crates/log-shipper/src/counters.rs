//! Throughput counters shared by the dispatch workers.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Success/failure totals with a delta baseline for periodic monitoring.
///
/// Workers bump the current totals with atomic adds. `snapshot_delta` reads
/// the totals, reports the change since the previous call and advances the
/// baseline; the baseline lock keeps two monitor calls from interleaving.
#[derive(Debug, Default)]
pub struct ThroughputCounters {
    curr_success: AtomicI64,
    curr_failure: AtomicI64,
    /// (last_success, last_failure)
    baseline: Mutex<(i64, i64)>,
}

impl ThroughputCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `events` successfully delivered events.
    pub fn record_success(&self, events: usize) {
        self.curr_success.fetch_add(events as i64, Ordering::Relaxed);
    }

    /// Count `events` events whose delivery attempt failed.
    pub fn record_failure(&self, events: usize) {
        self.curr_failure.fetch_add(events as i64, Ordering::Relaxed);
    }

    /// Total successes since creation.
    pub fn total_success(&self) -> i64 {
        self.curr_success.load(Ordering::Relaxed)
    }

    /// Total failures since creation.
    pub fn total_failure(&self) -> i64 {
        self.curr_failure.load(Ordering::Relaxed)
    }

    /// Return `(success_delta, failure_delta)` since the previous call and
    /// advance the baseline.
    pub fn snapshot_delta(&self) -> (i64, i64) {
        let mut baseline = self.baseline.lock();
        let curr_success = self.total_success();
        let curr_failure = self.total_failure();
        let delta = (curr_success - baseline.0, curr_failure - baseline.1);
        *baseline = (curr_success, curr_failure);
        delta
    }
}
