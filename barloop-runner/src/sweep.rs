//! Parameter sweep over dual moving average windows.
//!
//! Every grid point runs as an independent simulation against one shared,
//! read-only store; each run owns its own context and portfolio.

use rayon::prelude::*;
use std::collections::HashMap;

use barloop_core::domain::DatasetHash;
use barloop_core::HistoryStore;

use crate::config::{AlgorithmConfig, BacktestConfig};
use crate::runner::{run_backtest_on_store, BacktestResult, RunError};

/// Window ranges to sweep.
#[derive(Debug, Clone)]
pub struct ParamGrid {
    pub short_windows: Vec<usize>,
    pub long_windows: Vec<usize>,
}

impl ParamGrid {
    /// Short windows 10, 20, 30 against long windows 50, 100, 200.
    pub fn dual_moving_average_default() -> Self {
        Self {
            short_windows: vec![10, 20, 30],
            long_windows: vec![50, 100, 200],
        }
    }

    /// Number of valid (0 < short < long) combinations.
    pub fn size(&self) -> usize {
        self.short_windows
            .iter()
            .filter(|&&s| s != 0)
            .map(|s| self.long_windows.iter().filter(|&&l| *s < l).count())
            .sum()
    }

    /// One config per valid window pair, inheriting everything else from `base`.
    ///
    /// The symbol and share count come from `base` when it already is a
    /// dual moving average; otherwise the base algorithm's symbol is used.
    pub fn generate_configs(&self, base: &BacktestConfig) -> Vec<BacktestConfig> {
        let (symbol, shares) = match &base.algorithm {
            AlgorithmConfig::DualMovingAverage { symbol, shares, .. } => (symbol.clone(), *shares),
            other => (other.symbol().to_string(), 100),
        };

        let mut configs = Vec::with_capacity(self.size());
        for &short in &self.short_windows {
            for &long in &self.long_windows {
                if short == 0 || short >= long {
                    continue;
                }
                let mut config = base.clone();
                config.algorithm = AlgorithmConfig::DualMovingAverage {
                    symbol: symbol.clone(),
                    short_window: short,
                    long_window: long,
                    shares,
                };
                configs.push(config);
            }
        }
        configs
    }
}

/// Parameter sweep executor.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self { parallel: true }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every grid point. The first failing run aborts the sweep.
    pub fn sweep(
        &self,
        grid: &ParamGrid,
        base: &BacktestConfig,
        store: &HistoryStore,
        dataset_hash: &DatasetHash,
        has_synthetic: bool,
    ) -> Result<SweepResults, RunError> {
        let configs = grid.generate_configs(base);
        let run = |config: &BacktestConfig| {
            run_backtest_on_store(config, store, dataset_hash, has_synthetic)
        };

        let results = if self.parallel {
            configs.par_iter().map(run).collect::<Result<Vec<_>, _>>()?
        } else {
            configs.iter().map(run).collect::<Result<Vec<_>, _>>()?
        };
        Ok(SweepResults::new(results))
    }
}

/// Results from a parameter sweep, in grid order.
#[derive(Debug)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(results: Vec<BacktestResult>) -> Self {
        let by_run_id = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.run_id.clone(), i))
            .collect();
        Self { results, by_run_id }
    }

    pub fn all(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&BacktestResult> {
        self.by_run_id.get(run_id).map(|&i| &self.results[i])
    }

    /// Results sorted by Sharpe ratio, best first.
    pub fn sorted_by_sharpe(&self) -> Vec<&BacktestResult> {
        let mut sorted: Vec<_> = self.results.iter().collect();
        sorted.sort_by(|a, b| b.metrics.sharpe.total_cmp(&a.metrics.sharpe));
        sorted
    }

    pub fn best(&self) -> Option<&BacktestResult> {
        self.sorted_by_sharpe().into_iter().next()
    }
}
