// Copyright (c) James Kassemi, SC, US. All rights reserved.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub use config::ConfigError;

/// Workspace configuration knobs.
///
/// Loaded from an optional `config.toml` next to the binary, then overridden
/// by `CANDLE_*` environment variables (`CANDLE_WORKER__NUM_SHARDS=4`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub worker: WorkerSettings,
    pub publisher: PublisherSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Number of shards pairs are partitioned across. Must be > 0.
    pub num_shards: u32,
    /// Finalizer tick period in milliseconds.
    pub tick_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            num_shards: 16,
            tick_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    Memory,
    Jetstream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    pub kind: PublisherKind,
    pub jetstream: JetStreamSettings,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            kind: PublisherKind::Memory,
            jetstream: JetStreamSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JetStreamSettings {
    pub url: String,
    pub stream: String,
    pub subject_root: String,
    pub publish_timeout_ms: u64,
}

impl Default for JetStreamSettings {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream: "DEX".to_string(),
            subject_root: "dex.sol".to_string(),
            publish_timeout_ms: 500,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config.toml").required(false))
            .add_source(
                Environment::with_prefix("CANDLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        settings.try_deserialize()
    }
}
