use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives progress events from multi-cohort runs.
///
/// Cohorts finish on rayon worker threads, so implementations must be `Sync`.
pub trait CohortProgressObserver: Sync {
    fn on_start(&self, _: usize) {}
    fn on_cohort_finished(&self, _: u64) {}
    fn on_finish(&self) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl CohortProgressObserver for NoProgress {}

/// Counts finished cohorts; handy for tests and log summaries.
#[derive(Debug, Default)]
pub struct CountingProgress {
    expected: AtomicUsize,
    finished: AtomicUsize,
}

impl CountingProgress {
    pub fn expected(&self) -> usize {
        self.expected.load(Ordering::Relaxed)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Relaxed)
    }
}

impl CohortProgressObserver for CountingProgress {
    fn on_start(&self, total: usize) {
        self.expected.store(total, Ordering::Relaxed);
    }

    fn on_cohort_finished(&self, _: u64) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }
}
