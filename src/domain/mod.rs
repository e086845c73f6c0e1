//! Core domain types and logic.

pub mod ohlcv;
pub mod position;
pub mod ledger;
pub mod costs;
pub mod indicator;
pub mod signal;
pub mod sizing;
pub mod valuation;
pub mod backtest;
pub mod benchmark;
pub mod metrics;
pub mod universe;
pub mod code_data;
pub mod config_validation;
pub mod error;
