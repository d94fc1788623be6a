// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Offline replayer: feeds recorded trades through the candle worker.
//!
//! Input is newline-delimited CSV `pair,unix_seconds,price,base,quote`;
//! lines beginning with `#` and blank lines are skipped. Knobs (shard count,
//! tick period, publisher selection) come from `config.toml` / `CANDLE_*`
//! environment variables.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::{env, fs, process, thread};

use candle_engine::{CandleWorker, WorkerConfig, WorkerError};
use core_types::config::{AppConfig, ConfigError, PublisherKind};
use csv::{ReaderBuilder, StringRecord, Trim};
use engine_api::{Engine, EngineError};
use fixed_point::FixedPoint;
use log::{info, warn};
use publisher::{InMemoryPublisher, JetStreamConfig, JetStreamPublisher, PublishError};
use thiserror::Error;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("replayer failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let input = parse_input_path()?;
    let config = AppConfig::load()?;

    let worker = CandleWorker::new(WorkerConfig {
        label: "replay".to_string(),
        num_shards: config.worker.num_shards,
        tick: Duration::from_millis(config.worker.tick_ms),
    })?;

    let collector = match config.publisher.kind {
        PublisherKind::Memory => {
            let collector = Arc::new(InMemoryPublisher::new());
            worker.set_publisher(collector.clone());
            Some(collector)
        }
        PublisherKind::Jetstream => {
            let settings = &config.publisher.jetstream;
            let jetstream = JetStreamPublisher::connect(JetStreamConfig {
                url: settings.url.clone(),
                stream: settings.stream.clone(),
                subject_root: settings.subject_root.clone(),
                publish_timeout: Duration::from_millis(settings.publish_timeout_ms),
            })?;
            worker.set_publisher(Arc::new(jetstream));
            None
        }
    };

    worker.start()?;
    let file = fs::File::open(&input)?;
    let stats = replay(file, &worker)?;
    info!(
        "replayed {} trades from {} ({} rows skipped)",
        stats.trades,
        input.display(),
        stats.skipped
    );

    // Give the wall-clock finalizer one tick, then harvest explicitly so a
    // short replay does not race it.
    thread::sleep(Duration::from_millis(config.worker.tick_ms));
    worker.finalize_pass(unix_now());

    let metrics = worker.metrics();
    println!(
        "trades accepted: {} (dropped: {}, numeric failures: {})",
        metrics.trades_accepted, metrics.trades_dropped, metrics.update_failures
    );
    println!(
        "candles finalized: {} (publish errors: {})",
        metrics.candles_finalized, metrics.publish_errors
    );
    if let Some(collector) = collector {
        println!("candles collected in memory: {}", collector.snapshot().len());
    }

    worker.stop()?;
    Ok(())
}

fn parse_input_path() -> Result<PathBuf, AppError> {
    env::args().nth(1).map(PathBuf::from).ok_or(AppError::Usage)
}

#[derive(Default)]
struct ReplayStats {
    trades: u64,
    skipped: u64,
}

fn replay<R: Read>(input: R, worker: &CandleWorker) -> Result<ReplayStats, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);
    let mut stats = ReplayStats::default();
    for record in reader.records() {
        let record = record?;
        match parse_trade(&record) {
            Some(trade) => {
                worker.on_trade(
                    &trade.pair_id,
                    trade.timestamp,
                    trade.price,
                    trade.base_amount,
                    trade.quote_amount,
                );
                stats.trades += 1;
            }
            None => {
                warn!("skipping malformed row: {record:?}");
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

struct TradeRow {
    pair_id: String,
    timestamp: u64,
    price: FixedPoint,
    base_amount: FixedPoint,
    quote_amount: FixedPoint,
}

fn parse_trade(record: &StringRecord) -> Option<TradeRow> {
    if record.len() < 5 {
        return None;
    }
    let pair_id = record.get(0)?;
    if pair_id.is_empty() {
        return None;
    }
    let timestamp: u64 = record.get(1)?.parse().ok()?;
    let price: f64 = record.get(2)?.parse().ok()?;
    let base_amount: f64 = record.get(3)?.parse().ok()?;
    let quote_amount: f64 = record.get(4)?.parse().ok()?;
    Some(TradeRow {
        pair_id: pair_id.to_string(),
        timestamp,
        price: FixedPoint::from_double(price),
        base_amount: FixedPoint::from_double(base_amount),
        quote_amount: FixedPoint::from_double(quote_amount),
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: replayer <trades.csv>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Publisher(#[from] PublishError),
    #[error("input error: {0}")]
    Input(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(parse_trade(&StringRecord::from(vec!["SOL/USDC", "1700000060"])).is_none());
        assert!(
            parse_trade(&StringRecord::from(vec![
                "SOL/USDC",
                "not-a-time",
                "100.0",
                "10.0",
                "1000.0",
            ]))
            .is_none()
        );
        assert!(
            parse_trade(&StringRecord::from(vec![
                "",
                "1700000060",
                "100.0",
                "10.0",
                "1000.0",
            ]))
            .is_none()
        );
    }

    #[test]
    fn well_formed_rows_convert_through_from_double() {
        let trade = parse_trade(&StringRecord::from(vec![
            "SOL/USDC",
            "1700000060",
            "100.5",
            "10.0",
            "1005.0",
        ]))
        .unwrap();
        assert_eq!(trade.pair_id, "SOL/USDC");
        assert_eq!(trade.timestamp, 1_700_000_060);
        assert_eq!(trade.price, FixedPoint::from_double(100.5));
        assert_eq!(trade.base_amount, FixedPoint::from_double(10.0));
        assert_eq!(trade.quote_amount, FixedPoint::from_double(1005.0));
    }

    #[test]
    fn replay_skips_comments_and_blank_lines() {
        let csv = "\
# pair, unix_seconds, price, base, quote
SOL/USDC, 4000000030, 100.0, 10.0, 1000.0

SOL/USDC, 4000000045, 120.0, 5.0, 600.0
garbage line
";
        let worker = CandleWorker::new(WorkerConfig {
            label: "replay-test".to_string(),
            num_shards: 2,
            tick: Duration::from_millis(10),
        })
        .unwrap();
        let collector = Arc::new(InMemoryPublisher::new());
        worker.set_publisher(collector.clone());
        worker.start().unwrap();

        let stats = replay(csv.as_bytes(), &worker).unwrap();
        assert_eq!(stats.trades, 2);
        assert_eq!(stats.skipped, 1);

        worker.finalize_pass(4_000_000_080);
        let emitted = collector.snapshot();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].candle.trades, 2);
        assert_eq!(
            emitted[0].candle.volume,
            FixedPoint::from_double(15.0)
        );
        worker.stop().unwrap();
    }
}
