//! Performance series: one row per tick, in clock order.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::Frequency;
use crate::domain::Fill;

/// Snapshot taken after a tick's callbacks return. Never mutated once pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub portfolio_value: f64,
    pub cash: f64,
    pub positions_value: f64,
    pub recorded: BTreeMap<String, f64>,
}

/// The output of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSeries {
    pub frequency: Frequency,
    pub starting_cash: f64,
    rows: Vec<PerformanceRow>,
    /// Union of recorded keys across all ticks, in order of first appearance.
    recorded_columns: Vec<String>,
    transactions: Vec<Fill>,
}

/// Fixed leading columns of the tabular view.
pub const BASE_COLUMNS: [&str; 3] = ["date", "portfolio_value", "cash"];

impl PerformanceSeries {
    pub(crate) fn new(frequency: Frequency, starting_cash: f64, capacity: usize) -> Self {
        Self {
            frequency,
            starting_cash,
            rows: Vec::with_capacity(capacity),
            recorded_columns: Vec::new(),
            transactions: Vec::new(),
        }
    }

    /// Append the next tick's row. `recorded` keeps the callback's write order
    /// so new columns are discovered in the order the user introduced them.
    pub(crate) fn push(
        &mut self,
        timestamp: NaiveDateTime,
        portfolio_value: f64,
        cash: f64,
        recorded: Vec<(String, f64)>,
        fills: Vec<Fill>,
    ) -> &PerformanceRow {
        for (key, _) in &recorded {
            if !self.recorded_columns.iter().any(|c| c == key) {
                self.recorded_columns.push(key.clone());
            }
        }
        self.transactions.extend(fills);
        let index = self.rows.len();
        self.rows.push(PerformanceRow {
            index,
            timestamp,
            portfolio_value,
            cash,
            positions_value: portfolio_value - cash,
            recorded: recorded.into_iter().collect(),
        });
        &self.rows[index]
    }

    pub fn rows(&self) -> &[PerformanceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PerformanceRow> {
        self.rows.get(index)
    }

    pub fn recorded_columns(&self) -> &[String] {
        &self.recorded_columns
    }

    /// `date, portfolio_value, cash, <recorded...>`.
    pub fn columns(&self) -> Vec<String> {
        BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.recorded_columns.iter().cloned())
            .collect()
    }

    /// A numeric column by name. Ticks that did not record the key are `None`.
    /// Returns `None` for unknown columns (and for `date`, which is not numeric).
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        match name {
            "portfolio_value" => Some(self.rows.iter().map(|r| Some(r.portfolio_value)).collect()),
            "cash" => Some(self.rows.iter().map(|r| Some(r.cash)).collect()),
            "positions_value" => Some(self.rows.iter().map(|r| Some(r.positions_value)).collect()),
            _ if self.recorded_columns.iter().any(|c| c == name) => Some(
                self.rows
                    .iter()
                    .map(|r| r.recorded.get(name).copied())
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    pub fn portfolio_values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.portfolio_value).collect()
    }

    /// Portfolio value after the last tick, or starting cash for an empty run.
    pub fn final_value(&self) -> f64 {
        self.rows
            .last()
            .map_or(self.starting_cash, |r| r.portfolio_value)
    }

    pub fn transactions(&self) -> &[Fill] {
        &self.transactions
    }
}
