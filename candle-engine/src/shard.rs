use std::collections::HashMap;
use std::sync::Arc;

use fixed_point::FixedPoint;
use log::warn;
use parking_lot::Mutex;

use core_types::WindowSize;

use crate::window::WindowAggregator;

/// The six aggregators owned for one pair, in canonical granularity order.
pub type PairWindows = Arc<Vec<Arc<WindowAggregator>>>;

/// Horizontal partition of the pair universe.
///
/// The outer map is write-rare (one allocation per pair, ever) and its guard
/// is released before any aggregator is touched; the per-aggregator guards
/// carry the hot contention. Aggregators are never removed while the worker
/// lives, which is what lets the finalizer operate on snapshots of this map.
pub struct Shard {
    index: u32,
    pairs: Mutex<HashMap<String, PairWindows>>,
}

impl Shard {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            pairs: Mutex::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the aggregator list for `pair_id`, allocating all six
    /// granularities on first sight.
    pub fn windows_for_pair(&self, pair_id: &str) -> PairWindows {
        let mut pairs = self.pairs.lock();
        if let Some(windows) = pairs.get(pair_id) {
            return Arc::clone(windows);
        }
        let windows: PairWindows = Arc::new(
            WindowSize::PROVISIONED
                .iter()
                .map(|window| Arc::new(WindowAggregator::new(*window, pair_id)))
                .collect(),
        );
        pairs.insert(pair_id.to_string(), Arc::clone(&windows));
        windows
    }

    /// Folds one trade into every granularity for the pair. Numeric failures
    /// affect only the failing granularity; they are logged and counted, and
    /// the trade is otherwise dropped for that aggregator. Returns the
    /// number of failed updates.
    pub fn process_trade(
        &self,
        pair_id: &str,
        timestamp: u64,
        price: FixedPoint,
        base_amount: FixedPoint,
        quote_amount: FixedPoint,
    ) -> u64 {
        let windows = self.windows_for_pair(pair_id);
        let mut failures = 0;
        for aggregator in windows.iter() {
            if let Err(err) = aggregator.update(timestamp, price, base_amount, quote_amount) {
                warn!(
                    "shard {}: dropping trade for {} {} at t={}: {}",
                    self.index,
                    pair_id,
                    aggregator.window_size(),
                    timestamp,
                    err
                );
                failures += 1;
            }
        }
        failures
    }

    /// Snapshot of the pair list for the finalizer. Cheap clones of the
    /// `Arc`s; the shard guard is held only for the copy.
    pub fn snapshot_pairs(&self) -> Vec<(String, PairWindows)> {
        self.pairs
            .lock()
            .iter()
            .map(|(pair_id, windows)| (pair_id.clone(), Arc::clone(windows)))
            .collect()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.lock().len()
    }
}
