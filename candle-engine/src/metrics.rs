use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct WorkerMetricsInner {
    trades_accepted: AtomicU64,
    trades_dropped: AtomicU64,
    update_failures: AtomicU64,
    candles_finalized: AtomicU64,
    publish_errors: AtomicU64,
}

/// Cheap shared counters for the worker's hot paths.
#[derive(Clone, Default)]
pub struct WorkerMetrics {
    inner: Arc<WorkerMetricsInner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerMetricsSnapshot {
    pub trades_accepted: u64,
    pub trades_dropped: u64,
    pub update_failures: u64,
    pub candles_finalized: u64,
    pub publish_errors: u64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_trades_accepted(&self) {
        self.inner.trades_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_trades_dropped(&self) {
        self.inner.trades_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_update_failures(&self, delta: u64) {
        if delta > 0 {
            self.inner.update_failures.fetch_add(delta, Ordering::Relaxed);
        }
    }

    pub fn inc_candles_finalized(&self) {
        self.inner.candles_finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_publish_errors(&self) {
        self.inner.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            trades_accepted: self.inner.trades_accepted.load(Ordering::Relaxed),
            trades_dropped: self.inner.trades_dropped.load(Ordering::Relaxed),
            update_failures: self.inner.update_failures.load(Ordering::Relaxed),
            candles_finalized: self.inner.candles_finalized.load(Ordering::Relaxed),
            publish_errors: self.inner.publish_errors.load(Ordering::Relaxed),
        }
    }
}
