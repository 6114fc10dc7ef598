use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Minimal counters for operational visibility.
///
/// Observability only: nothing in the scheduler reads them back.
#[derive(Clone, Default)]
pub struct Counters {
    pub dispatched: Arc<AtomicU64>,
    pub completed: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    pub retried: Arc<AtomicU64>,
    pub timed_out: Arc<AtomicU64>,

    // skip reasons
    pub skipped_precondition: Arc<AtomicU64>,
    pub tiers_skipped_by_limit: Arc<AtomicU64>,

    pub batches: Arc<AtomicU64>,
    pub stages_completed: Arc<AtomicU64>,
    pub invalidated: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub timed_out: u64,
    pub skipped_precondition: u64,
    pub tiers_skipped_by_limit: u64,
    pub batches: u64,
    pub stages_completed: u64,
    pub invalidated: u64,
}

impl Counters {
    pub fn incr(c: &AtomicU64) {
        c.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        CounterSnapshot {
            dispatched: load(&self.dispatched),
            completed: load(&self.completed),
            failed: load(&self.failed),
            retried: load(&self.retried),
            timed_out: load(&self.timed_out),
            skipped_precondition: load(&self.skipped_precondition),
            tiers_skipped_by_limit: load(&self.tiers_skipped_by_limit),
            batches: load(&self.batches),
            stages_completed: load(&self.stages_completed),
            invalidated: load(&self.invalidated),
        }
    }
}
