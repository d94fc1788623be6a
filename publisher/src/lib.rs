//! Candle delivery: the publisher capability plus its two implementations,
//! an in-memory collector for tests and a NATS JetStream adapter.

mod jetstream;

use core_types::{Candle, WindowSize};
use parking_lot::Mutex;
use thiserror::Error;

pub use jetstream::{CandleMessage, JetStreamConfig, JetStreamPublisher};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publisher runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("jetstream connect failed: {0}")]
    Connect(String),
    #[error("jetstream stream setup failed: {0}")]
    Stream(String),
    #[error("publish timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("jetstream publish failed: {0}")]
    Publish(String),
}

/// Sink for finalized (and re-emitted provisional) candles.
///
/// Called from the worker's finalizer thread only; implementations that
/// batch or retry do so behind this one method. Delivery ordering across
/// candles is not constrained, and implementations may deduplicate by
/// `(pair_id, window, open_time)`.
pub trait CandlePublisher: Send + Sync {
    fn publish(
        &self,
        pair_id: &str,
        window: WindowSize,
        candle: &Candle,
    ) -> Result<(), PublishError>;
}

/// One recorded `publish` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedCandle {
    pub pair_id: String,
    pub window: WindowSize,
    pub candle: Candle,
}

/// Publisher that collects every emit in memory. Used by tests and as the
/// bootstrap sink before a durable publisher is configured.
#[derive(Default)]
pub struct InMemoryPublisher {
    emitted: Mutex<Vec<EmittedCandle>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<EmittedCandle> {
        self.emitted.lock().clone()
    }
}

impl CandlePublisher for InMemoryPublisher {
    fn publish(
        &self,
        pair_id: &str,
        window: WindowSize,
        candle: &Candle,
    ) -> Result<(), PublishError> {
        self.emitted.lock().push(EmittedCandle {
            pair_id: pair_id.to_string(),
            window,
            candle: *candle,
        });
        Ok(())
    }
}
