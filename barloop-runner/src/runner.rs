//! Backtest runner: wires together config, data loading, the engine, and metrics.
//!
//! Two entry points:
//! - `run_backtest()`: loads data per the config, then runs. Used by the CLI.
//! - `run_backtest_on_store()`: takes a pre-loaded store. Used by sweeps.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use barloop_core::domain::{DatasetHash, RunId};
use barloop_core::{HistoryStore, PerformanceSeries, SimError, Simulation};

use crate::config::{AlgorithmConfig, BacktestConfig, ConfigError};
use crate::data_loader::{load_bars, LoadError, LoadOptions};
use crate::metrics::PerformanceMetrics;
use crate::strategies::build_algorithm;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("simulation failed: {0}")]
    Sim(#[from] SimError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub config_id: String,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub algorithm: String,
    pub config: AlgorithmConfig,
    pub symbol: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_cash: f64,
    pub metrics: PerformanceMetrics,
    pub series: PerformanceSeries,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Loader options for a config: the run window widened by `lookback_days`
/// so warm-up history exists before the first tick.
pub fn load_options(config: &BacktestConfig) -> Result<LoadOptions, ConfigError> {
    let params = config.run_params()?;
    Ok(LoadOptions {
        dir: config.data.dir.clone(),
        synthetic: config.data.synthetic,
        seed: config.data.seed,
        start: params.start - Duration::days(i64::from(config.data.lookback_days)),
        end: params.end,
        frequency: params.frequency,
        calendar: params.calendar,
    })
}

/// Load data and run the configured algorithm.
pub fn run_backtest(config: &BacktestConfig) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let opts = load_options(config)?;
    let loaded = load_bars(&config.symbols(), &opts)?;
    run_backtest_on_store(
        config,
        &loaded.store,
        &loaded.dataset_hash,
        loaded.has_synthetic,
    )
}

/// Run a config against an already loaded store, no I/O.
pub fn run_backtest_on_store(
    config: &BacktestConfig,
    store: &HistoryStore,
    dataset_hash: &DatasetHash,
    has_synthetic: bool,
) -> Result<BacktestResult, RunError> {
    let params = config.run_params()?;
    let config_id = config.config_id();
    let run_id = RunId::new(config_id.clone(), dataset_hash.clone());

    let algorithm = build_algorithm(&config.algorithm);
    let series = Simulation::new(
        store,
        params.clock().map_err(ConfigError::from)?,
        algorithm,
        params.initial_cash,
        params.allow_margin,
    )?
    .run()?;
    let metrics = PerformanceMetrics::compute(&series);

    info!(
        run_id = %run_id.hash(),
        algorithm = config.algorithm.name(),
        total_return = metrics.total_return,
        fills = metrics.fill_count,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: run_id.hash(),
        config_id: config_id.0,
        dataset_hash: dataset_hash.0.clone(),
        has_synthetic,
        algorithm: config.algorithm.name().to_string(),
        config: config.algorithm.clone(),
        symbol: config.algorithm.symbol().to_string(),
        start_date: params.start.to_string(),
        end_date: params.end.to_string(),
        initial_cash: params.initial_cash,
        metrics,
        series,
    })
}
