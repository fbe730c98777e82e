//! Serializable backtest configuration, loaded from TOML.
//!
//! ```toml
//! [backtest]
//! start_date = "2020-01-02"
//! end_date = "2020-12-31"
//! initial_cash = 100000.0
//! frequency = "1d"
//!
//! [calendar]
//! kind = "weekdays"
//! holidays = ["2020-12-25"]
//!
//! [data]
//! dir = "data"
//!
//! [algorithm]
//! type = "dual_moving_average"
//! symbol = "AAPL"
//! short_window = 100
//! long_window = 300
//! ```

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use barloop_core::domain::{normalize_symbol, ConfigId};
use barloop_core::{EngineError, Frequency, RunParams, SessionKind, TradingCalendar};

/// Errors from reading or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid date for {field}: '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },

    #[error("invalid time for {field}: '{value}' (expected HH:MM)")]
    InvalidTime { field: &'static str, value: String },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Top-level configuration for a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    #[serde(default)]
    pub calendar: CalendarSection,
    #[serde(default)]
    pub data: DataSection,
    pub algorithm: AlgorithmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestSection {
    /// First session to simulate (inclusive), `YYYY-MM-DD`.
    pub start_date: String,
    /// Last session to simulate (inclusive), `YYYY-MM-DD`.
    pub end_date: String,
    pub initial_cash: f64,
    /// `"1d"` or `"1m"`.
    #[serde(default = "default_frequency")]
    pub frequency: String,
    #[serde(default)]
    pub allow_margin: bool,
}

fn default_frequency() -> String {
    Frequency::Daily.as_str().to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CalendarSection {
    #[serde(default)]
    pub kind: SessionKind,
    #[serde(default)]
    pub holidays: Vec<String>,
    /// Session open, `HH:MM`. Defaults to 09:30.
    pub open: Option<String>,
    /// Session close, `HH:MM`. Defaults to 16:00.
    pub close: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSection {
    /// Directory of `<SYMBOL>.csv` files.
    pub dir: Option<PathBuf>,
    /// Generate seeded random-walk bars for symbols with no CSV file.
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Calendar days of synthetic history generated before `start_date`.
    #[serde(default)]
    pub lookback_days: u32,
    /// Extra symbols to load beyond those the algorithm names.
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dir: None,
            synthetic: false,
            seed: default_seed(),
            lookback_days: 0,
            symbols: Vec::new(),
        }
    }
}

fn default_seed() -> u64 {
    42
}

/// Built-in algorithm selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    /// Buy as many whole shares as cash allows on the first tick, then hold.
    BuyAndHold { symbol: String },

    /// Long when the short moving average is above the long one, flat otherwise.
    DualMovingAverage {
        symbol: String,
        #[serde(default = "default_short_window")]
        short_window: usize,
        #[serde(default = "default_long_window")]
        long_window: usize,
        /// Position held while the short average is above the long one.
        #[serde(default = "default_shares")]
        shares: i64,
    },

    /// Rebalance to a fixed fraction of portfolio value every tick.
    TargetPercent { symbol: String, fraction: f64 },
}

fn default_short_window() -> usize {
    100
}

fn default_long_window() -> usize {
    300
}

fn default_shares() -> i64 {
    100
}

impl AlgorithmConfig {
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmConfig::BuyAndHold { .. } => "buy_and_hold",
            AlgorithmConfig::DualMovingAverage { .. } => "dual_moving_average",
            AlgorithmConfig::TargetPercent { .. } => "target_percent",
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            AlgorithmConfig::BuyAndHold { symbol }
            | AlgorithmConfig::DualMovingAverage { symbol, .. }
            | AlgorithmConfig::TargetPercent { symbol, .. } => symbol,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol().trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "algorithm.symbol",
                reason: "must not be empty".into(),
            });
        }
        match *self {
            AlgorithmConfig::DualMovingAverage {
                short_window,
                long_window,
                ..
            } => {
                if short_window == 0 || short_window >= long_window {
                    return Err(ConfigError::InvalidValue {
                        field: "algorithm.short_window",
                        reason: format!(
                            "need 0 < short_window < long_window, got {short_window} and {long_window}"
                        ),
                    });
                }
            }
            AlgorithmConfig::TargetPercent { fraction, .. } => {
                if !fraction.is_finite() {
                    return Err(ConfigError::InvalidValue {
                        field: "algorithm.fraction",
                        reason: format!("must be finite, got {fraction}"),
                    });
                }
            }
            AlgorithmConfig::BuyAndHold { .. } => {}
        }
        Ok(())
    }
}

impl BacktestConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check every field that can be wrong without touching data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run_params()?;
        self.algorithm.validate()?;
        if self.data.dir.is_none() && !self.data.synthetic {
            return Err(ConfigError::InvalidValue {
                field: "data.dir",
                reason: "required unless data.synthetic = true".into(),
            });
        }
        Ok(())
    }

    pub fn start_date(&self) -> Result<NaiveDate, ConfigError> {
        parse_date("backtest.start_date", &self.backtest.start_date)
    }

    pub fn end_date(&self) -> Result<NaiveDate, ConfigError> {
        parse_date("backtest.end_date", &self.backtest.end_date)
    }

    pub fn frequency(&self) -> Result<Frequency, ConfigError> {
        Ok(self.backtest.frequency.parse::<Frequency>()?)
    }

    pub fn trading_calendar(&self) -> Result<TradingCalendar, ConfigError> {
        let section = &self.calendar;
        let holidays = section
            .holidays
            .iter()
            .map(|h| parse_date("calendar.holidays", h))
            .collect::<Result<Vec<_>, _>>()?;
        let mut calendar = TradingCalendar::new(section.kind).with_holidays(holidays);
        if section.open.is_some() || section.close.is_some() {
            let open = match &section.open {
                Some(s) => parse_time("calendar.open", s)?,
                None => calendar.open_time(),
            };
            let close = match &section.close {
                Some(s) => parse_time("calendar.close", s)?,
                None => calendar.close_time(),
            };
            calendar = calendar.with_session(open, close)?;
        }
        Ok(calendar)
    }

    /// Engine parameters for this config.
    pub fn run_params(&self) -> Result<RunParams, ConfigError> {
        let start = self.start_date()?;
        let end = self.end_date()?;
        if start > end {
            return Err(EngineError::InvalidRange(format!(
                "start date {start} is after end date {end}"
            ))
            .into());
        }
        let cash = self.backtest.initial_cash;
        if !cash.is_finite() || cash < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "backtest.initial_cash",
                reason: format!("must be a non-negative number, got {cash}"),
            });
        }
        Ok(RunParams::new(start, end, cash)
            .with_frequency(self.frequency()?)
            .with_margin(self.backtest.allow_margin)
            .with_calendar(self.trading_calendar()?))
    }

    /// Every symbol the run needs, normalized, deduplicated, algorithm's first.
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let named = std::iter::once(self.algorithm.symbol()).chain(self.data.symbols.iter().map(String::as_str));
        for symbol in named.map(normalize_symbol) {
            if !symbol.is_empty() && !out.contains(&symbol) {
                out.push(symbol);
            }
        }
        out
    }

    /// Deterministic content hash of the configuration.
    pub fn config_id(&self) -> ConfigId {
        // Serializing a plain data struct to JSON cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        ConfigId::from_hash(&blake3::hash(json.as_bytes()).to_hex())
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

fn parse_time(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    let v = value.trim();
    NaiveTime::parse_from_str(v, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(v, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTime {
            field,
            value: value.to_string(),
        })
}
