//! Export: JSON, CSV, and Markdown artifacts for a finished run.
//!
//! - **JSON**: the full `BacktestResult`, with schema versioning
//! - **CSV**: the per-tick performance table and the transaction list
//! - **Markdown**: a short human-readable summary
//!
//! Unknown (newer) schema versions are rejected on load.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use barloop_core::{Fill, PerformanceSeries};

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// The performance table: `date, portfolio_value, cash, <recorded...>`.
///
/// Recorded columns absent on a tick are written as empty cells.
pub fn export_performance_csv(series: &PerformanceSeries) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(series.columns())?;

    for row in series.rows() {
        let mut record = vec![
            row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("{:.6}", row.portfolio_value),
            format!("{:.6}", row.cash),
        ];
        record.extend(series.recorded_columns().iter().map(|key| {
            row.recorded
                .get(key)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One line per fill, in settlement order.
pub fn export_transactions_csv(fills: &[Fill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "order_id",
        "tick_index",
        "timestamp",
        "symbol",
        "shares",
        "price",
        "notional",
    ])?;
    for f in fills {
        wtr.write_record([
            &f.order_id.0.to_string(),
            &f.tick_index.to_string(),
            &f.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            &f.symbol,
            &f.shares.to_string(),
            &format!("{:.6}", f.price),
            &format!("{:.2}", f.notional()),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single run.
///
/// Creates `{algorithm}_{symbol}_{run id prefix}/` under `output_dir` with
/// `manifest.json`, `performance.csv`, `transactions.csv` and `report.md`.
/// Returns the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let short_id: String = result.run_id.chars().take(12).collect();
    let run_dir = output_dir.join(format!("{}_{}_{}", result.algorithm, result.symbol, short_id));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("manifest.json", export_json(result)?),
        ("performance.csv", export_performance_csv(&result.series)?),
        (
            "transactions.csv",
            export_transactions_csv(result.series.transactions())?,
        ),
        ("report.md", generate_report(result)),
    ];
    for (name, contents) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(result: &BacktestResult) -> String {
    let m = &result.metrics;
    let mut md = String::with_capacity(1024);

    md.push_str("# Backtest Report\n\n");
    md.push_str("| Field | Value |\n| --- | --- |\n");
    let _ = writeln!(md, "| Algorithm | {} |", result.algorithm);
    let _ = writeln!(md, "| Symbol | {} |", result.symbol);
    let _ = writeln!(md, "| Period | {} to {} |", result.start_date, result.end_date);
    let _ = writeln!(md, "| Frequency | {} |", result.series.frequency);
    let _ = writeln!(md, "| Initial Cash | {:.2} |", result.initial_cash);
    let _ = writeln!(md, "| Run Id | {} |", result.run_id);
    let _ = writeln!(md, "| Dataset Hash | {} |", result.dataset_hash);
    if result.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }

    md.push_str("\n## Performance\n\n| Metric | Value |\n| --- | --- |\n");
    let _ = writeln!(md, "| Ending Value | {:.2} |", m.ending_value);
    let _ = writeln!(md, "| Total Return | {:.2}% |", m.total_return * 100.0);
    let _ = writeln!(md, "| CAGR | {:.2}% |", m.cagr * 100.0);
    let _ = writeln!(md, "| Sharpe | {:.3} |", m.sharpe);
    let _ = writeln!(md, "| Sortino | {:.3} |", m.sortino);
    let _ = writeln!(md, "| Max Drawdown | {:.2}% |", m.max_drawdown * 100.0);
    let _ = writeln!(md, "| Fills | {} |", m.fill_count);
    let _ = writeln!(md, "| Ticks | {} |", m.tick_count);
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BacktestConfig;
    use crate::runner::run_backtest;

    fn sample_result() -> BacktestResult {
        let config = BacktestConfig::from_toml(
            r#"
[backtest]
start_date = "2024-01-02"
end_date = "2024-01-31"
initial_cash = 10000.0

[data]
synthetic = true

[algorithm]
type = "target_percent"
symbol = "SPY"
fraction = 0.5
"#,
        )
        .unwrap();
        run_backtest(&config).unwrap()
    }

    #[test]
    fn json_roundtrip() {
        let result = sample_result();
        let back = import_json(&export_json(&result).unwrap()).unwrap();
        assert_eq!(back.run_id, result.run_id);
        assert_eq!(back.metrics.fill_count, result.metrics.fill_count);
        assert_eq!(back.series.len(), result.series.len());
        assert_eq!(back.series.timestamps(), result.series.timestamps());
        assert_eq!(back.series.columns(), result.series.columns());
        assert!((back.series.final_value() - result.series.final_value()).abs() < 1e-6);
    }

    #[test]
    fn json_rejects_unknown_version() {
        let mut result = sample_result();
        result.schema_version = SCHEMA_VERSION + 1;
        let json = serde_json::to_string(&result).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version"));
    }

    #[test]
    fn json_without_version_defaults_to_current() {
        let result = sample_result();
        let mut value = serde_json::to_value(&result).unwrap();
        value.as_object_mut().unwrap().remove("schema_version");
        let back = import_json(&value.to_string()).unwrap();
        assert_eq!(back.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn performance_csv_has_one_line_per_tick() {
        let result = sample_result();
        let csv = export_performance_csv(&result.series).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("date,portfolio_value,cash,price,shares"));
        assert_eq!(lines.count(), result.series.len());
    }

    #[test]
    fn transactions_csv_lists_fills() {
        let result = sample_result();
        let csv = export_transactions_csv(result.series.transactions()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "order_id,tick_index,timestamp,symbol,shares,price,notional");
        assert_eq!(lines.len(), result.series.transactions().len() + 1);
        assert!(lines[1].contains(",SPY,"));
    }

    #[test]
    fn transactions_csv_empty() {
        assert_eq!(export_transactions_csv(&[]).unwrap().lines().count(), 1);
    }

    #[test]
    fn report_flags_synthetic_data() {
        let md = generate_report(&sample_result());
        assert!(md.contains("# Backtest Report"));
        assert!(md.contains("| Algorithm | target_percent |"));
        assert!(md.contains("**SYNTHETIC**"));
    }

    #[test]
    fn save_load_artifacts_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_result();
        let run_dir = save_artifacts(&result, dir.path()).unwrap();

        for name in ["manifest.json", "performance.csv", "transactions.csv", "report.md"] {
            assert!(run_dir.join(name).is_file(), "missing {name}");
        }
        let loaded = load_artifacts(&run_dir).unwrap();
        assert_eq!(loaded.run_id, result.run_id);
    }
}
