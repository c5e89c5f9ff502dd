use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Worker-side counters, updated from the search loop and drained by the
/// periodic stats log line. Atomic so the loop never takes a lock.
#[derive(Debug)]
pub struct WorkerStats {
    attempts: AtomicU64,
    solutions_found: AtomicU64,
    accepted: AtomicU64,
    rejected_stale: AtomicU64,
    rejected_invalid: AtomicU64,
    transport_errors: AtomicU64,
    template_fetches: AtomicU64,
    start_time: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    pub attempts: u64,
    pub solutions_found: u64,
    pub accepted: u64,
    pub rejected_stale: u64,
    pub rejected_invalid: u64,
    pub transport_errors: u64,
    pub template_fetches: u64,
    pub uptime_seconds: u64,
    pub attempts_per_second: f64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            solutions_found: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected_stale: AtomicU64::new(0),
            rejected_invalid: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            template_fetches: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_attempts(&self, count: u64) {
        self.attempts.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_solution_found(&self) {
        self.solutions_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_stale(&self) {
        self.rejected_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_invalid(&self) {
        self.rejected_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_template_fetch(&self) {
        self.template_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed();
        let attempts_per_second = if uptime.as_secs_f64() > 0.0 {
            attempts as f64 / uptime.as_secs_f64()
        } else {
            0.0
        };
        WorkerStatsSnapshot {
            attempts,
            solutions_found: self.solutions_found.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_stale: self.rejected_stale.load(Ordering::Relaxed),
            rejected_invalid: self.rejected_invalid.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            template_fetches: self.template_fetches.load(Ordering::Relaxed),
            uptime_seconds: uptime.as_secs(),
            attempts_per_second,
        }
    }
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = WorkerStats::new();
        stats.record_attempts(4096);
        stats.record_attempts(4096);
        stats.record_solution_found();
        stats.record_accepted();
        stats.record_rejected_stale();
        stats.record_template_fetch();

        let snap = stats.snapshot();
        assert_eq!(snap.attempts, 8192);
        assert_eq!(snap.solutions_found, 1);
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.rejected_stale, 1);
        assert_eq!(snap.rejected_invalid, 0);
        assert_eq!(snap.template_fetches, 1);
        assert!(snap.attempts_per_second > 0.0);
    }
}
