// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::fmt;
use std::str::FromStr;

use fixed_point::FixedPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time granularity of a candle window, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowSize {
    Sec1,
    Min1,
    Min5,
    Min15,
    Hour1,
    Hour4,
    Day1,
}

impl WindowSize {
    /// Granularities the worker allocates per pair, in canonical order.
    /// `Sec1` exists for completeness but is not provisioned.
    pub const PROVISIONED: [WindowSize; 6] = [
        WindowSize::Min1,
        WindowSize::Min5,
        WindowSize::Min15,
        WindowSize::Hour1,
        WindowSize::Hour4,
        WindowSize::Day1,
    ];

    pub const fn seconds(self) -> u64 {
        match self {
            WindowSize::Sec1 => 1,
            WindowSize::Min1 => 60,
            WindowSize::Min5 => 300,
            WindowSize::Min15 => 900,
            WindowSize::Hour1 => 3_600,
            WindowSize::Hour4 => 14_400,
            WindowSize::Day1 => 86_400,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            WindowSize::Sec1 => "1s",
            WindowSize::Min1 => "1m",
            WindowSize::Min5 => "5m",
            WindowSize::Min15 => "15m",
            WindowSize::Hour1 => "1h",
            WindowSize::Hour4 => "4h",
            WindowSize::Day1 => "1d",
        }
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown window size '{value}' (expected 1s, 1m, 5m, 15m, 1h, 4h or 1d)")]
pub struct ParseWindowSizeError {
    pub value: String,
}

impl FromStr for WindowSize {
    type Err = ParseWindowSizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "1s" => Ok(WindowSize::Sec1),
            "1m" => Ok(WindowSize::Min1),
            "5m" => Ok(WindowSize::Min5),
            "15m" => Ok(WindowSize::Min15),
            "1h" => Ok(WindowSize::Hour1),
            "4h" => Ok(WindowSize::Hour4),
            "1d" => Ok(WindowSize::Day1),
            other => Err(ParseWindowSizeError {
                value: other.to_string(),
            }),
        }
    }
}

/// One OHLCV sample for a single pair and window.
///
/// While the window is open the candle is `provisional` and keeps folding
/// trades in; finalization flips the flag and hands the candle to the
/// publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Window start, unix seconds. Always a multiple of the window size.
    pub open_time: u64,
    /// Window end, unix seconds: `open_time + window_size`.
    pub close_time: u64,
    pub open: FixedPoint,
    pub high: FixedPoint,
    pub low: FixedPoint,
    pub close: FixedPoint,
    /// Cumulative base-asset amount.
    pub volume: FixedPoint,
    /// Cumulative quote-asset amount.
    pub quote_volume: FixedPoint,
    pub trades: u32,
    pub provisional: bool,
}
