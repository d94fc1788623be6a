use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use core_types::{Candle, WindowSize};
use fixed_point::{FixedPoint, FixedPointError};
use parking_lot::Mutex;

/// Candle table for one (pair, granularity) combination.
///
/// Holds at most a handful of live candles keyed by window start, plus the
/// high-water mark of observed trade time. One mutex guards both; it is the
/// hot lock of the engine, so nothing slower than a map operation happens
/// under it.
pub struct WindowAggregator {
    window_size: WindowSize,
    pair_id: String,
    state: Mutex<AggregatorState>,
}

#[derive(Default)]
struct AggregatorState {
    candles: BTreeMap<u64, Candle>,
    last_trade_time: u64,
}

impl WindowAggregator {
    pub fn new(window_size: WindowSize, pair_id: impl Into<String>) -> Self {
        Self {
            window_size,
            pair_id: pair_id.into(),
            state: Mutex::new(AggregatorState::default()),
        }
    }

    pub fn window_size(&self) -> WindowSize {
        self.window_size
    }

    pub fn pair_id(&self) -> &str {
        &self.pair_id
    }

    /// Start of the window containing `timestamp` (floor semantics, so a
    /// trade landing exactly on a close boundary opens the next window).
    pub fn window_start(&self, timestamp: u64) -> u64 {
        let width = self.window_size.seconds();
        timestamp / width * width
    }

    /// Watermark of the latest accepted trade; zero until the first trade.
    /// Monotone: out-of-order trades never move it backwards.
    pub fn last_trade_time(&self) -> u64 {
        self.state.lock().last_trade_time
    }

    pub fn live_candles(&self) -> usize {
        self.state.lock().candles.len()
    }

    pub fn candle_at(&self, window_start: u64) -> Option<Candle> {
        self.state.lock().candles.get(&window_start).copied()
    }

    /// Folds one trade into the candle for its window, creating the candle
    /// on first sight. A numeric failure leaves the candle and the
    /// watermark exactly as they were.
    pub fn update(
        &self,
        timestamp: u64,
        price: FixedPoint,
        base_amount: FixedPoint,
        quote_amount: FixedPoint,
    ) -> Result<(), FixedPointError> {
        let window_start = self.window_start(timestamp);
        let window_end = window_start + self.window_size.seconds();

        let mut state = self.state.lock();
        match state.candles.entry(window_start) {
            Entry::Vacant(vacant) => {
                vacant.insert(Candle {
                    open_time: window_start,
                    close_time: window_end,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: base_amount,
                    quote_volume: quote_amount,
                    trades: 1,
                    provisional: true,
                });
            }
            Entry::Occupied(mut occupied) => {
                let candle = occupied.get_mut();
                // Validate both accumulations before mutating anything.
                let volume = candle.volume.checked_add(base_amount)?;
                let quote_volume = candle.quote_volume.checked_add(quote_amount)?;
                if price > candle.high {
                    candle.high = price;
                }
                if price < candle.low {
                    candle.low = price;
                }
                candle.close = price;
                candle.volume = volume;
                candle.quote_volume = quote_volume;
                candle.trades += 1;
            }
        }
        if timestamp > state.last_trade_time {
            state.last_trade_time = timestamp;
        }
        Ok(())
    }

    /// Removes every candle whose window closed at or before `watermark`,
    /// flips it non-provisional and returns the batch in ascending
    /// `open_time` order. Window starts are the map keys, so the eligible
    /// candles are exactly the leading entries.
    pub fn finalize_before(&self, watermark: u64) -> Vec<Candle> {
        let mut state = self.state.lock();
        let mut finalized = Vec::new();
        while let Some(entry) = state.candles.first_entry() {
            if entry.get().close_time > watermark {
                break;
            }
            let mut candle = entry.remove();
            candle.provisional = false;
            finalized.push(candle);
        }
        finalized
    }
}
