//! Barloop CLI: run backtests, sweep parameters, and manage CSV data.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config file
//! - `sweep`: grid search dual moving average windows over one dataset
//! - `synth`: write seeded synthetic bars as `<SYMBOL>.csv` files
//! - `symbols`: list the symbols available in a data directory

mod logging;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use barloop_core::{Frequency, TradingCalendar};
use barloop_runner::data_loader::{
    generate_synthetic_bars, list_symbols, read_bars_csv, write_bars_csv,
};
use barloop_runner::export::{export_json, save_artifacts};
use barloop_runner::{
    load_bars, load_options, run_backtest, AlgorithmConfig, BacktestConfig, BacktestResult,
    ParamGrid, ParamSweep,
};

#[derive(Parser)]
#[command(name = "barloop", about = "Barloop CLI: event-driven backtesting engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Use synthetic data for symbols with no CSV file.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Output directory for the artifact bundle.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Skip writing artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,

        /// Print the full result as JSON instead of the summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Grid search dual moving average windows with the config's data and dates.
    Sweep {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Short windows, comma separated.
        #[arg(long, value_delimiter = ',', default_values_t = vec![10usize, 20, 30])]
        short: Vec<usize>,

        /// Long windows, comma separated.
        #[arg(long, value_delimiter = ',', default_values_t = vec![50usize, 100, 200])]
        long: Vec<usize>,

        /// Run grid points one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// How many results to print, best Sharpe first.
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Write seeded synthetic bars as CSV files.
    Synth {
        /// Symbols to generate (e.g., SPY QQQ).
        #[arg(long, num_args = 1.., required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Bar frequency: 1d or 1m.
        #[arg(long, default_value = "1d")]
        frequency: String,

        /// Random seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
    /// List symbols available in a data directory.
    Symbols {
        /// Data directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            synthetic,
            output_dir,
            no_save,
            json,
        } => run_backtest_cmd(&config, synthetic, &output_dir, no_save, json),
        Commands::Sweep {
            config,
            short,
            long,
            sequential,
            top,
        } => run_sweep_cmd(&config, short, long, sequential, top),
        Commands::Synth {
            symbols,
            start,
            end,
            frequency,
            seed,
            out_dir,
        } => run_synth(&symbols, &start, &end, &frequency, seed, &out_dir),
        Commands::Symbols { data_dir } => run_symbols(&data_dir),
    }
}

fn load_config(path: &Path, synthetic: bool) -> Result<BacktestConfig> {
    let mut config = BacktestConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    if synthetic {
        config.data.synthetic = true;
    }
    Ok(config)
}

fn run_backtest_cmd(
    config_path: &Path,
    synthetic: bool,
    output_dir: &Path,
    no_save: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, synthetic)?;
    let result = run_backtest(&config)?;

    if json {
        println!("{}", export_json(&result)?);
    } else {
        print_summary(&result);
    }

    if !no_save {
        let run_dir = save_artifacts(&result, output_dir)?;
        eprintln!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn run_sweep_cmd(
    config_path: &Path,
    short: Vec<usize>,
    long: Vec<usize>,
    sequential: bool,
    top: usize,
) -> Result<()> {
    let config = load_config(config_path, false)?;
    let grid = ParamGrid {
        short_windows: short,
        long_windows: long,
    };
    if grid.size() == 0 {
        bail!("no valid window pairs: every short window must be below some long window");
    }

    let loaded = load_bars(&config.symbols(), &load_options(&config)?)?;
    let results = ParamSweep::new().with_parallelism(!sequential).sweep(
        &grid,
        &config,
        &loaded.store,
        &loaded.dataset_hash,
        loaded.has_synthetic,
    )?;
    info!(runs = results.len(), parallel = !sequential, "sweep complete");

    println!("{} runs, best Sharpe first:", results.len());
    println!(
        "{:<8} {:<8} {:>10} {:>10} {:>10} {:>7}",
        "Short", "Long", "Return", "Sharpe", "MaxDD", "Fills"
    );
    println!("{}", "-".repeat(58));
    for result in results.sorted_by_sharpe().into_iter().take(top) {
        let Some((short, long)) = config_windows(result) else {
            continue;
        };
        let m = &result.metrics;
        println!(
            "{:<8} {:<8} {:>9.2}% {:>10.3} {:>9.2}% {:>7}",
            short,
            long,
            m.total_return * 100.0,
            m.sharpe,
            m.max_drawdown * 100.0,
            m.fill_count
        );
    }
    if loaded.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    Ok(())
}

fn config_windows(result: &BacktestResult) -> Option<(usize, usize)> {
    match result.config {
        AlgorithmConfig::DualMovingAverage {
            short_window,
            long_window,
            ..
        } => Some((short_window, long_window)),
        _ => None,
    }
}

fn run_synth(
    symbols: &[String],
    start: &str,
    end: &str,
    frequency: &str,
    seed: u64,
    out_dir: &Path,
) -> Result<()> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("invalid --start '{start}'"))?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
        .with_context(|| format!("invalid --end '{end}'"))?;
    if start > end {
        bail!("--start {start} is after --end {end}");
    }
    let frequency: Frequency = frequency.parse()?;
    let calendar = TradingCalendar::weekdays();

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    for symbol in symbols {
        let symbol = barloop_core::domain::normalize_symbol(symbol);
        let bars = generate_synthetic_bars(&symbol, seed, &calendar, start, end, frequency);
        let path = out_dir.join(format!("{symbol}.csv"));
        write_bars_csv(&path, frequency, &bars)?;
        info!(symbol = %symbol, bars = bars.len(), seed, "wrote synthetic bars");
        println!("{symbol}: {} bars -> {}", bars.len(), path.display());
    }
    Ok(())
}

fn run_symbols(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        println!("Data directory does not exist: {}", data_dir.display());
        return Ok(());
    }
    let symbols = list_symbols(data_dir)?;
    if symbols.is_empty() {
        println!("No CSV files in {}", data_dir.display());
        return Ok(());
    }

    let calendar = TradingCalendar::weekdays();
    println!("{:<8} {:<5} {:>8}  {:<41}", "Symbol", "Freq", "Bars", "Range");
    println!("{}", "-".repeat(66));
    for symbol in symbols {
        let path = data_dir.join(format!("{symbol}.csv"));
        match read_bars_csv(&path, &calendar) {
            Ok((frequency, bars)) => {
                let range = match (bars.first(), bars.last()) {
                    (Some(a), Some(b)) => format!("{} to {}", a.timestamp, b.timestamp),
                    _ => "(empty)".to_string(),
                };
                println!("{:<8} {:<5} {:>8}  {}", symbol, frequency, bars.len(), range);
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "skipping unreadable data file");
                println!("{symbol:<8} (unreadable: {e})");
            }
        }
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Algorithm:      {}", result.algorithm);
    println!("Symbol:         {}", result.symbol);
    println!("Period:         {} to {}", result.start_date, result.end_date);
    println!("Frequency:      {}", result.series.frequency);
    println!("Ticks:          {}", m.tick_count);
    println!("Fills:          {}", m.fill_count);
    println!();
    println!("--- Performance ---");
    println!("Initial Cash:   {:.2}", result.initial_cash);
    println!("Ending Value:   {:.2}", m.ending_value);
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("CAGR:           {:.2}%", m.cagr * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
