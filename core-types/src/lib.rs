// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Core types and configuration shared across the candle workspace.

pub mod config;
pub mod types;

pub use types::{Candle, ParseWindowSizeError, WindowSize};
