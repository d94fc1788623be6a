use std::time::Duration;

use async_nats::HeaderMap;
use async_nats::jetstream::{self, Context};
use core_types::{Candle, WindowSize};
use log::debug;
use prost::Message;
use tokio::runtime::{Builder, Runtime};
use tokio::time::timeout;

use crate::{CandlePublisher, PublishError};

#[derive(Debug, Clone)]
pub struct JetStreamConfig {
    pub url: String,
    pub stream: String,
    pub subject_root: String,
    pub publish_timeout: Duration,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream: "DEX".to_string(),
            subject_root: "dex.sol".to_string(),
            publish_timeout: Duration::from_millis(500),
        }
    }
}

/// Wire form of an emitted candle. Prices and volumes travel as raw Q32.32
/// values.
#[derive(Clone, PartialEq, Message)]
pub struct CandleMessage {
    #[prost(string, tag = "1")]
    pub pair_id: String,
    #[prost(uint32, tag = "2")]
    pub window_seconds: u32,
    #[prost(uint64, tag = "3")]
    pub open_time: u64,
    #[prost(uint64, tag = "4")]
    pub close_time: u64,
    #[prost(int64, tag = "5")]
    pub open: i64,
    #[prost(int64, tag = "6")]
    pub high: i64,
    #[prost(int64, tag = "7")]
    pub low: i64,
    #[prost(int64, tag = "8")]
    pub close: i64,
    #[prost(int64, tag = "9")]
    pub volume: i64,
    #[prost(int64, tag = "10")]
    pub quote_volume: i64,
    #[prost(uint32, tag = "11")]
    pub trades: u32,
    #[prost(bool, tag = "12")]
    pub provisional: bool,
}

impl CandleMessage {
    pub fn from_candle(pair_id: &str, window: WindowSize, candle: &Candle) -> Self {
        Self {
            pair_id: pair_id.to_string(),
            window_seconds: window.seconds() as u32,
            open_time: candle.open_time,
            close_time: candle.close_time,
            open: candle.open.raw(),
            high: candle.high.raw(),
            low: candle.low.raw(),
            close: candle.close.raw(),
            volume: candle.volume.raw(),
            quote_volume: candle.quote_volume.raw(),
            trades: candle.trades,
            provisional: candle.provisional,
        }
    }
}

/// Durable-stream publisher: serializes candles to protobuf and writes them
/// to a NATS JetStream subject.
///
/// Owns a single-thread tokio runtime because `publish` is called from the
/// worker's synchronous finalizer thread; every call blocks on the runtime
/// with the configured timeout. The message id `pair:window:open_time` lets
/// the stream deduplicate re-emits of the same window.
pub struct JetStreamPublisher {
    config: JetStreamConfig,
    runtime: Runtime,
    context: Context,
}

impl JetStreamPublisher {
    /// Connects and makes sure the target stream covers the candle subject
    /// space. Fails with a connect/stream error before any candle is
    /// accepted.
    pub fn connect(config: JetStreamConfig) -> Result<Self, PublishError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let context = runtime.block_on(async {
            let client = async_nats::connect(&config.url)
                .await
                .map_err(|err| PublishError::Connect(err.to_string()))?;
            let context = jetstream::new(client);
            context
                .get_or_create_stream(jetstream::stream::Config {
                    name: config.stream.clone(),
                    subjects: vec![format!("{}.candles.>", config.subject_root)],
                    ..Default::default()
                })
                .await
                .map_err(|err| PublishError::Stream(err.to_string()))?;
            Ok::<_, PublishError>(context)
        })?;
        debug!(
            "jetstream publisher connected to {} (stream {})",
            config.url, config.stream
        );
        Ok(Self {
            config,
            runtime,
            context,
        })
    }
}

impl CandlePublisher for JetStreamPublisher {
    fn publish(
        &self,
        pair_id: &str,
        window: WindowSize,
        candle: &Candle,
    ) -> Result<(), PublishError> {
        let subject = build_subject(&self.config.subject_root, pair_id, window);
        let payload = CandleMessage::from_candle(pair_id, window, candle).encode_to_vec();
        let msg_id = format!(
            "{}:{}:{}",
            sanitize_token(pair_id),
            window.label(),
            candle.open_time
        );
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", msg_id.as_str());

        let deadline = self.config.publish_timeout;
        self.runtime.block_on(async {
            let ack = timeout(
                deadline,
                self.context
                    .publish_with_headers(subject, headers, payload.into()),
            )
            .await
            .map_err(|_| PublishError::Timeout(deadline))?
            .map_err(|err| PublishError::Publish(err.to_string()))?;
            timeout(deadline, ack)
                .await
                .map_err(|_| PublishError::Timeout(deadline))?
                .map_err(|err| PublishError::Publish(err.to_string()))?;
            Ok(())
        })
    }
}

fn build_subject(root: &str, pair_id: &str, window: WindowSize) -> String {
    format!(
        "{root}.candles.{}.{}",
        sanitize_token(pair_id),
        window.label()
    )
}

/// NATS subjects treat `.`, spaces and wildcards specially; collapse
/// anything outside `[A-Za-z0-9_-]` to `_`.
fn sanitize_token(token: &str) -> String {
    token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixed_point::FixedPoint;

    #[test]
    fn subject_tokens_are_sanitized() {
        assert_eq!(sanitize_token("SOL/USDC"), "SOL_USDC");
        assert_eq!(sanitize_token("a b.c*d"), "a_b_c_d");
        assert_eq!(sanitize_token("WETH-USDT"), "WETH-USDT");
    }

    #[test]
    fn subject_carries_root_pair_and_window_label() {
        assert_eq!(
            build_subject("dex.sol", "SOL/USDC", WindowSize::Min5),
            "dex.sol.candles.SOL_USDC.5m"
        );
    }

    #[test]
    fn candle_message_carries_raw_fixed_point_values() {
        let candle = Candle {
            open_time: 1_700_000_040,
            close_time: 1_700_000_100,
            open: FixedPoint::from_double(100.0),
            high: FixedPoint::from_double(120.0),
            low: FixedPoint::from_double(90.0),
            close: FixedPoint::from_double(95.0),
            volume: FixedPoint::from_double(3.0),
            quote_volume: FixedPoint::from_double(300.0),
            trades: 3,
            provisional: false,
        };
        let message = CandleMessage::from_candle("SOL/USDC", WindowSize::Min1, &candle);
        assert_eq!(message.pair_id, "SOL/USDC");
        assert_eq!(message.window_seconds, 60);
        assert_eq!(message.open, FixedPoint::from_double(100.0).raw());
        assert_eq!(message.volume, FixedPoint::from_double(3.0).raw());
        assert_eq!(message.trades, 3);
        assert!(!message.provisional);
        assert!(!message.encode_to_vec().is_empty());
    }
}
