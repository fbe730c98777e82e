//! Barloop Runner: backtest orchestration on top of `barloop-core`.
//!
//! This crate provides:
//! - TOML run configuration
//! - Data loading from per-symbol CSV files, with opt-in synthetic fallback
//! - Built-in algorithms (buy and hold, dual moving average, target percent)
//! - Single-run orchestration with run fingerprinting
//! - Parallel parameter sweeps over a shared store
//! - Performance metrics and JSON/CSV/Markdown export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod strategies;
pub mod sweep;

pub use config::{AlgorithmConfig, BacktestConfig, ConfigError};
pub use data_loader::{load_bars, DataSource, LoadError, LoadOptions, LoadedData};
pub use metrics::PerformanceMetrics;
pub use runner::{
    load_options, run_backtest, run_backtest_on_store, BacktestResult, RunError, SCHEMA_VERSION,
};
pub use strategies::{build_algorithm, BuyAndHold, DualMovingAverage, TargetPercent};
pub use sweep::{ParamGrid, ParamSweep, SweepResults};
