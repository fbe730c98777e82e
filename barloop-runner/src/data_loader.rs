//! Bar loading and data resolution for the runner.
//!
//! Given a list of symbols, loads bars from a directory of `<SYMBOL>.csv`
//! files into a [`HistoryStore`]. Implements the fallback policy:
//! 1. If `<dir>/<SYMBOL>.csv` exists → parse it
//! 2. If not and synthetic data is enabled → generate seeded bars (tagged)
//! 3. Otherwise → fail with a clear error
//!
//! CSV files carry the header `date,open,high,low,close,volume`. A date-only
//! `date` column (`YYYY-MM-DD`) loads as daily bars stamped at the session
//! close; a datetime column (`YYYY-MM-DD HH:MM[:SS]`) loads as minute bars.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use barloop_core::domain::{normalize_symbol, Bar, DatasetHash};
use barloop_core::{DataError, Frequency, HistoryStore, TradingCalendar};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no data file for '{symbol}' in {dir} (enable synthetic data to generate bars)")]
    MissingData { symbol: String, dir: PathBuf },

    #[error("no data directory configured for '{symbol}' and synthetic data is disabled")]
    NoSource { symbol: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{path} row {row}: {reason}")]
    Parse {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub dir: Option<PathBuf>,
    /// Generate synthetic bars when a CSV file is unavailable.
    pub synthetic: bool,
    pub seed: u64,
    /// First session of synthetic data.
    pub start: NaiveDate,
    /// Last session of synthetic data.
    pub end: NaiveDate,
    /// Frequency of synthetic data.
    pub frequency: Frequency,
    /// Sessions and close times used to stamp daily bars.
    pub calendar: TradingCalendar,
}

/// Where a symbol's bars came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Csv,
    Synthetic,
}

/// Result of loading bars, including data source provenance.
#[derive(Debug)]
pub struct LoadedData {
    pub store: HistoryStore,
    /// Data source per symbol.
    pub sources: BTreeMap<String, DataSource>,
    /// BLAKE3 over all loaded bars.
    pub dataset_hash: DatasetHash,
    /// Whether any symbol used synthetic data.
    pub has_synthetic: bool,
}

/// Load bars for a set of symbols, with fallback to synthetic data.
///
/// This is the primary entry point for the runner to get bar data.
pub fn load_bars(symbols: &[String], opts: &LoadOptions) -> Result<LoadedData, LoadError> {
    let mut store = HistoryStore::new();
    let mut sources = BTreeMap::new();
    let mut has_synthetic = false;

    for raw in symbols {
        let symbol = normalize_symbol(raw);
        let asset = store.register(&symbol);

        let file = opts
            .dir
            .as_ref()
            .map(|dir| dir.join(format!("{symbol}.csv")))
            .filter(|path| path.is_file());

        if let Some(path) = file {
            let (frequency, bars) = read_bars_csv(&path, &opts.calendar)?;
            info!(%symbol, path = %path.display(), %frequency, bars = bars.len(), "loaded bars");
            store.extend(asset.id(), frequency, bars)?;
            sources.insert(symbol, DataSource::Csv);
            continue;
        }

        if opts.synthetic {
            warn!(%symbol, "generating synthetic data; results will be tagged as synthetic");
            let bars = generate_synthetic_bars(
                &symbol,
                opts.seed,
                &opts.calendar,
                opts.start,
                opts.end,
                opts.frequency,
            );
            store.extend(asset.id(), opts.frequency, bars)?;
            sources.insert(symbol, DataSource::Synthetic);
            has_synthetic = true;
            continue;
        }

        return Err(match &opts.dir {
            Some(dir) => LoadError::MissingData {
                symbol,
                dir: dir.clone(),
            },
            None => LoadError::NoSource { symbol },
        });
    }

    let dataset_hash = DatasetHash::from_hash(&store.fingerprint());
    Ok(LoadedData {
        store,
        sources,
        dataset_hash,
        has_synthetic,
    })
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

enum Stamp {
    Day(NaiveDate),
    Minute(NaiveDateTime),
}

fn parse_stamp(s: &str) -> Option<Stamp> {
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Stamp::Day(day));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(Stamp::Minute)
}

/// Parse one CSV file. The first row decides the frequency; every row must agree.
pub fn read_bars_csv(
    path: &Path,
    calendar: &TradingCalendar,
) -> Result<(Frequency, Vec<Bar>), LoadError> {
    let csv_err = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut frequency = None;
    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<CsvBar>().enumerate() {
        let row = i + 1;
        let record = record.map_err(csv_err)?;
        let parse_err = |reason: String| LoadError::Parse {
            path: path.to_path_buf(),
            row,
            reason,
        };
        let (row_frequency, timestamp) = match parse_stamp(&record.date) {
            Some(Stamp::Day(day)) => (Frequency::Daily, calendar.session_close(day)),
            Some(Stamp::Minute(ts)) => (Frequency::Minute, ts),
            None => return Err(parse_err(format!("unparseable date '{}'", record.date))),
        };
        match frequency {
            None => frequency = Some(row_frequency),
            Some(f) if f != row_frequency => {
                return Err(parse_err(format!(
                    "mixes {f} and {row_frequency} timestamps"
                )))
            }
            Some(_) => {}
        }
        bars.push(Bar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }

    Ok((frequency.unwrap_or(Frequency::Daily), bars))
}

/// Write bars in the loader's CSV layout.
pub fn write_bars_csv(path: &Path, frequency: Frequency, bars: &[Bar]) -> Result<(), LoadError> {
    let csv_err = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["date", "open", "high", "low", "close", "volume"])
        .map_err(csv_err)?;
    for bar in bars {
        let date = match frequency {
            Frequency::Daily => bar.timestamp.date().format("%Y-%m-%d").to_string(),
            Frequency::Minute => bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        wtr.write_record([
            date,
            format!("{:.4}", bar.open),
            format!("{:.4}", bar.high),
            format!("{:.4}", bar.low),
            format!("{:.4}", bar.close),
            format!("{:.0}", bar.volume),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Symbols with a `<SYMBOL>.csv` file in `dir`, sorted.
pub fn list_symbols(dir: &Path) -> Result<Vec<String>, LoadError> {
    let io_err = |source: std::io::Error| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut symbols = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            symbols.push(normalize_symbol(stem));
        }
    }
    symbols.sort();
    symbols.dedup();
    Ok(symbols)
}

/// Generate synthetic bars for testing/development.
///
/// Produces a seeded random walk from a starting price of 100.0 over the
/// calendar's sessions. These are clearly fake and tagged as synthetic.
pub fn generate_synthetic_bars(
    symbol: &str,
    seed: u64,
    calendar: &TradingCalendar,
    start: NaiveDate,
    end: NaiveDate,
    frequency: Frequency,
) -> Vec<Bar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // Deterministic seed from (seed, symbol)
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(symbol.as_bytes());
    let mut rng = StdRng::from_seed(*hasher.finalize().as_bytes());

    let (step, wick) = match frequency {
        Frequency::Daily => (0.03, 0.01),
        Frequency::Minute => (0.002, 0.0005),
    };

    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    for day in calendar.sessions(start, end) {
        let stamps: Vec<NaiveDateTime> = match frequency {
            Frequency::Daily => vec![calendar.session_close(day)],
            Frequency::Minute => {
                let open = calendar.session_open(day);
                (1..=calendar.minutes_per_session() as i64)
                    .map(|m| open + Duration::minutes(m))
                    .collect()
            }
        };
        for timestamp in stamps {
            let ret: f64 = rng.gen_range(-step..step);
            let open = price;
            let close = (price * (1.0 + ret)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..wick));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..wick));
            let volume = rng.gen_range(500_000..5_000_000u64) as f64;
            bars.push(Bar::new(timestamp, open, high, low, close, volume));
            price = close;
        }
    }
    bars
}
