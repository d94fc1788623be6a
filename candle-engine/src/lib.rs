// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Sharded OHLCV candle aggregation engine.
//!
//! Trades enter through [`CandleWorker::on_trade`], are routed to a shard by
//! a stable hash of the pair id, and fold into one provisional candle per
//! supported granularity. A background finalizer promotes candles whose
//! window has closed to the configured publisher.

pub mod metrics;
pub mod shard;
pub mod window;
pub mod worker;

pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};
pub use shard::{PairWindows, Shard};
pub use window::WindowAggregator;
pub use worker::{CandleWorker, WorkerConfig, WorkerError};
