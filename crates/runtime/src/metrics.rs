//! Mutation pipeline metrics and statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters maintained by the coordinator and the guard.
///
/// Uses atomics for lock-free access across tasks.
#[derive(Debug, Default)]
pub struct MutationMetrics {
    /// Plans applied successfully (including degraded successes)
    applied: AtomicU64,

    /// Plans that failed in any phase
    failed: AtomicU64,

    /// Failed plans whose snapshots were restored
    rolled_back: AtomicU64,

    /// Rollbacks that could not restore every snapshot
    rollback_errors: AtomicU64,

    /// Successful plans that carried derivation warnings
    degraded: AtomicU64,

    /// Resolver passes executed
    resolver_passes: AtomicU64,

    /// Unauthorized write attempts observed by the guard
    violations: AtomicU64,

    /// Applies rejected because an entity was busy
    busy_rejections: AtomicU64,

    /// Total time spent applying plans (nanoseconds)
    total_apply_nanos: AtomicU64,
}

impl MutationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_applied(&self, elapsed: Duration, degraded: bool) {
        self.applied.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        self.total_apply_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, rolled_back: bool) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if rolled_back {
            self.rolled_back.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rollback_error(&self) {
        self.rollback_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolver_pass(&self) {
        self.resolver_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_busy(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn rolled_back(&self) -> u64 {
        self.rolled_back.load(Ordering::Relaxed)
    }

    pub fn resolver_passes(&self) -> u64 {
        self.resolver_passes.load(Ordering::Relaxed)
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Calculates average apply time over successful plans.
    pub fn avg_apply_time(&self) -> Duration {
        let applied = self.applied();
        if applied == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_apply_nanos.load(Ordering::Relaxed) / applied)
        }
    }

    /// Creates a snapshot of all metrics for display/logging.
    ///
    /// Individual fields are read atomically; the snapshot as a whole may be
    /// inconsistent while plans are in flight.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            applied: self.applied(),
            failed: self.failed(),
            rolled_back: self.rolled_back(),
            rollback_errors: self.rollback_errors.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            resolver_passes: self.resolver_passes(),
            violations: self.violations(),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            avg_apply_time: self.avg_apply_time(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub applied: u64,
    pub failed: u64,
    pub rolled_back: u64,
    pub rollback_errors: u64,
    pub degraded: u64,
    pub resolver_passes: u64,
    pub violations: u64,
    pub busy_rejections: u64,
    pub avg_apply_time: Duration,
}
