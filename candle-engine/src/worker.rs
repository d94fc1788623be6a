use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use engine_api::{Engine, EngineError, EngineHealth, EngineResult, HealthStatus};
use fixed_point::FixedPoint;
use log::{error, info};
use parking_lot::Mutex;
use publisher::{CandlePublisher, InMemoryPublisher, PublishError};
use thiserror::Error;

use core_types::{Candle, WindowSize};

use crate::metrics::{WorkerMetrics, WorkerMetricsSnapshot};
use crate::shard::Shard;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

#[derive(Clone)]
pub struct WorkerConfig {
    pub label: String,
    /// Number of shards pairs are partitioned across. Must be > 0.
    pub num_shards: u32,
    /// Finalizer tick period. 1 s over-samples the finest (1 m) granularity
    /// by 60x, which keeps close-to-publish latency low at negligible cost.
    pub tick: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            label: "dev".to_string(),
            num_shards: 16,
            tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("num_shards must be greater than zero")]
    InvalidShardCount,
}

/// Sharded candle worker: routes trades to shards on the ingest path and
/// owns the finalizer thread that promotes closed candles to the publisher.
///
/// Candles are emitted only for pairs that have produced at least one trade;
/// the finalizer skips aggregators whose watermark is still zero, so idle
/// pairs never generate output even though the watermark is wall-clock time.
pub struct CandleWorker {
    inner: Arc<WorkerInner>,
}

impl std::fmt::Debug for CandleWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleWorker").finish_non_exhaustive()
    }
}

struct WorkerInner {
    config: WorkerConfig,
    shards: Vec<Shard>,
    running: AtomicBool,
    state: Mutex<RuntimeState>,
    publisher: Mutex<Arc<dyn CandlePublisher>>,
    health: Mutex<EngineHealth>,
    metrics: WorkerMetrics,
}

enum RuntimeState {
    Stopped,
    Running(JoinHandle<()>),
}

impl CandleWorker {
    pub fn new(config: WorkerConfig) -> Result<Self, WorkerError> {
        if config.num_shards == 0 {
            return Err(WorkerError::InvalidShardCount);
        }
        let shards = (0..config.num_shards).map(Shard::new).collect();
        Ok(Self {
            inner: Arc::new(WorkerInner {
                config,
                shards,
                running: AtomicBool::new(false),
                state: Mutex::new(RuntimeState::Stopped),
                publisher: Mutex::new(Arc::new(InMemoryPublisher::new())),
                health: Mutex::new(EngineHealth::default()),
                metrics: WorkerMetrics::new(),
            }),
        })
    }

    /// Ingest one trade. Any number of threads may call this concurrently.
    /// Dropped silently while the worker is not running.
    pub fn on_trade(
        &self,
        pair_id: &str,
        timestamp: u64,
        price: FixedPoint,
        base_amount: FixedPoint,
        quote_amount: FixedPoint,
    ) {
        if !self.inner.running.load(Ordering::Acquire) {
            self.inner.metrics.inc_trades_dropped();
            return;
        }
        let shard = &self.inner.shards[self.shard_for_pair(pair_id) as usize];
        let failures = shard.process_trade(pair_id, timestamp, price, base_amount, quote_amount);
        self.inner.metrics.inc_trades_accepted();
        self.inner.metrics.add_update_failures(failures);
    }

    /// Installs the publisher the finalizer emits to. Serialized against
    /// in-flight emits by the publisher guard.
    pub fn set_publisher(&self, publisher: Arc<dyn CandlePublisher>) {
        *self.inner.publisher.lock() = publisher;
    }

    /// Forwards one candle to the installed publisher.
    pub fn emit_candle(
        &self,
        pair_id: &str,
        window: WindowSize,
        candle: &Candle,
    ) -> Result<(), PublishError> {
        self.inner.emit_candle(pair_id, window, candle)
    }

    /// Stable shard assignment: FNV-1a over the pair id, mod shard count.
    /// The hash is part of the contract; tests pin concrete assignments.
    pub fn shard_for_pair(&self, pair_id: &str) -> u32 {
        hash_pair_id(pair_id) % self.inner.config.num_shards
    }

    /// Runs one finalizer pass against an explicit watermark. The background
    /// loop calls this every tick with wall-clock seconds; replay tooling
    /// and tests call it directly to drain closed windows deterministically.
    pub fn finalize_pass(&self, watermark: u64) {
        self.inner.finalize_pass(watermark);
    }

    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl Engine for CandleWorker {
    /// Idempotent: starting a running worker is a no-op.
    fn start(&self) -> EngineResult<()> {
        let mut state = self.inner.state.lock();
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.set_health(HealthStatus::Starting, None);
        let runner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(format!("{}-finalizer", self.inner.config.label))
            .spawn(move || runner.finalize_loop())
            .map_err(|err| {
                self.inner.running.store(false, Ordering::Release);
                self.inner
                    .set_health(HealthStatus::Failed, Some(err.to_string()));
                EngineError::Failure {
                    source: Box::new(err),
                }
            })?;
        *state = RuntimeState::Running(handle);
        self.inner.set_health(HealthStatus::Ready, None);
        info!(
            "[{}] candle worker started with {} shards",
            self.inner.config.label, self.inner.config.num_shards
        );
        Ok(())
    }

    /// Idempotent: stopping a stopped worker is a no-op. Signals the
    /// finalizer and joins it; the in-flight pass completes first.
    fn stop(&self) -> EngineResult<()> {
        let mut state = self.inner.state.lock();
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let RuntimeState::Running(handle) = std::mem::replace(&mut *state, RuntimeState::Stopped)
        {
            if handle.join().is_err() {
                error!("[{}] finalizer thread panicked", self.inner.config.label);
            }
        }
        self.inner.set_health(HealthStatus::Stopped, None);
        info!("[{}] candle worker stopped", self.inner.config.label);
        Ok(())
    }

    fn health(&self) -> EngineHealth {
        self.inner.health.lock().clone()
    }
}

impl Drop for CandleWorker {
    fn drop(&mut self) {
        let _ = Engine::stop(self);
    }
}

impl WorkerInner {
    fn finalize_loop(self: Arc<Self>) {
        while self.running.load(Ordering::Acquire) {
            thread::sleep(self.config.tick);
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.finalize_pass(unix_now());
        }
    }

    fn finalize_pass(&self, watermark: u64) {
        for shard in &self.shards {
            let pairs = shard.snapshot_pairs();
            for (pair_id, windows) in pairs {
                for aggregator in windows.iter() {
                    // A zero watermark means the pair never traded at this
                    // granularity; skip it instead of walking empty maps.
                    if aggregator.last_trade_time() == 0 {
                        continue;
                    }
                    for candle in aggregator.finalize_before(watermark) {
                        match self.emit_candle(&pair_id, aggregator.window_size(), &candle) {
                            Ok(()) => self.metrics.inc_candles_finalized(),
                            Err(err) => {
                                // The candle is already out of the map; it is
                                // not re-inserted on failure.
                                self.metrics.inc_publish_errors();
                                self.set_health(HealthStatus::Degraded, Some(err.to_string()));
                                error!(
                                    "[{}] publish failed for {} {} open_time={}: {}",
                                    self.config.label,
                                    pair_id,
                                    aggregator.window_size(),
                                    candle.open_time,
                                    err
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    fn emit_candle(
        &self,
        pair_id: &str,
        window: WindowSize,
        candle: &Candle,
    ) -> Result<(), PublishError> {
        let publisher = self.publisher.lock();
        publisher.publish(pair_id, window, candle)
    }

    fn set_health(&self, status: HealthStatus, detail: Option<String>) {
        let mut health = self.health.lock();
        health.status = status;
        health.detail = detail;
    }
}

fn hash_pair_id(pair_id: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in pair_id.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
