//! Per-tick view of the history store, pinned to the tick's timestamp.

use chrono::NaiveDateTime;

use super::store::HistoryStore;
use crate::clock::Frequency;
use crate::domain::{Asset, Bar, BarField};
use crate::error::EngineError;

/// What `handle_data` sees: the store, scoped to `as_of`.
///
/// Nothing reachable through a `BarData` is timestamped after `as_of`.
#[derive(Debug, Clone, Copy)]
pub struct BarData<'a> {
    store: &'a HistoryStore,
    as_of: NaiveDateTime,
    frequency: Frequency,
}

impl<'a> BarData<'a> {
    pub fn new(store: &'a HistoryStore, as_of: NaiveDateTime, frequency: Frequency) -> Self {
        Self {
            store,
            as_of,
            frequency,
        }
    }

    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn store(&self) -> &'a HistoryStore {
        self.store
    }

    pub fn symbol(&self, ticker: &str) -> Result<Asset, EngineError> {
        self.store.symbol(ticker)
    }

    pub fn current(&self, asset: &Asset, field: BarField) -> Result<f64, EngineError> {
        self.store.current(asset.id(), field, self.as_of)
    }

    pub fn current_bar(&self, asset: &Asset) -> Result<&'a Bar, EngineError> {
        self.store.current_bar(asset.id(), self.as_of)
    }

    /// Trailing window at the run's own frequency.
    pub fn history(
        &self,
        asset: &Asset,
        field: BarField,
        bar_count: usize,
    ) -> Result<Vec<f64>, EngineError> {
        self.history_at(asset, field, bar_count, self.frequency)
    }

    pub fn history_at(
        &self,
        asset: &Asset,
        field: BarField,
        bar_count: usize,
        frequency: Frequency,
    ) -> Result<Vec<f64>, EngineError> {
        self.store
            .history(asset.id(), field, bar_count, frequency, self.as_of)
    }

    /// True once the asset has any bar at or before `as_of`.
    pub fn can_trade(&self, asset: &Asset) -> bool {
        self.store.current_bar(asset.id(), self.as_of).is_ok()
    }

    /// True if the latest visible bar is not stamped at `as_of` (price carried forward).
    pub fn is_stale(&self, asset: &Asset) -> bool {
        self.store
            .current_bar(asset.id(), self.as_of)
            .map_or(true, |bar| bar.timestamp != self.as_of)
    }
}
