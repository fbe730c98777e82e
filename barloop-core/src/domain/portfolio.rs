//! Portfolio: aggregate state of cash + all open positions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::asset::{Asset, AssetId};
use super::bar::BarField;
use super::position::Position;
use crate::data::HistoryStore;
use crate::error::EngineError;

/// Aggregate portfolio state.
///
/// The accounting identity holds at every tick:
/// `value == cash + sum(shares * current price)`.
/// Positions are keyed by asset id so valuation sums in a stable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    cash: f64,
    starting_cash: f64,
    positions: BTreeMap<AssetId, Position>,
}

impl Portfolio {
    pub fn new(starting_cash: f64) -> Self {
        Self {
            cash: starting_cash,
            starting_cash,
            positions: BTreeMap::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn starting_cash(&self) -> f64 {
        self.starting_cash
    }

    /// Signed share count held in `asset` (0 when flat).
    pub fn shares(&self, asset: AssetId) -> i64 {
        self.positions.get(&asset).map_or(0, |p| p.shares)
    }

    /// Get a position by asset (only open positions are stored).
    pub fn position(&self, asset: AssetId) -> Option<&Position> {
        self.positions.get(&asset)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }

    /// Sum of `shares * current price` over all open positions as of `as_of`.
    pub fn positions_value(
        &self,
        store: &HistoryStore,
        as_of: NaiveDateTime,
    ) -> Result<f64, EngineError> {
        self.positions.values().try_fold(0.0, |acc, pos| {
            let price = store.current(pos.asset, BarField::Price, as_of)?;
            Ok(acc + pos.market_value(price))
        })
    }

    /// Total value = cash + sum of all position market values.
    pub fn value(&self, store: &HistoryStore, as_of: NaiveDateTime) -> Result<f64, EngineError> {
        Ok(self.cash + self.positions_value(store, as_of)?)
    }

    /// Settle a fill: cash moves by `-delta * price`, shares by `+delta`.
    ///
    /// The position's cost basis is updated alongside its share count; a
    /// position that goes flat is dropped. On error nothing changes.
    pub fn apply_fill(
        &mut self,
        asset: &Asset,
        delta_shares: i64,
        price: f64,
    ) -> Result<(), EngineError> {
        if delta_shares == 0 {
            return Ok(());
        }
        let pos = self
            .positions
            .entry(asset.id())
            .or_insert_with(|| Position::new(asset.id(), asset.symbol().to_string()));
        pos.apply(delta_shares, price)?;
        if pos.is_flat() {
            self.positions.remove(&asset.id());
        }
        self.cash -= delta_shares as f64 * price;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Frequency;
    use crate::domain::Bar;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn store_with_prices(prices: &[f64]) -> (HistoryStore, Asset) {
        let mut store = HistoryStore::new();
        let asset = store.register("SPY");
        for (i, &p) in prices.iter().enumerate() {
            store
                .append(asset.id(), Frequency::Daily, Bar::flat(ts(i as u32 + 1), p, 1_000.0))
                .unwrap();
        }
        (store, asset)
    }

    #[test]
    fn value_with_no_positions() {
        let (store, _) = store_with_prices(&[100.0]);
        let portfolio = Portfolio::new(100_000.0);
        assert_eq!(portfolio.value(&store, ts(1)).unwrap(), 100_000.0);
    }

    #[test]
    fn value_marks_to_current_price() {
        let (store, asset) = store_with_prices(&[100.0, 110.0]);
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&asset, 100, 100.0).unwrap();
        assert_eq!(portfolio.cash(), 90_000.0);
        // 90_000 + 100 * 110 = 101_000
        assert_eq!(portfolio.value(&store, ts(2)).unwrap(), 101_000.0);
        assert_eq!(portfolio.value(&store, ts(1)).unwrap(), 100_000.0);
    }

    #[test]
    fn apply_fill_closes_position() {
        let (_, asset) = store_with_prices(&[100.0]);
        let mut portfolio = Portfolio::new(1_000.0);
        portfolio.apply_fill(&asset, 5, 100.0).unwrap();
        assert_eq!(portfolio.shares(asset.id()), 5);
        portfolio.apply_fill(&asset, -5, 120.0).unwrap();
        assert_eq!(portfolio.shares(asset.id()), 0);
        assert!(portfolio.position(asset.id()).is_none());
        assert_eq!(portfolio.cash(), 1_100.0);
    }

    #[test]
    fn zero_delta_is_a_no_op() {
        let (_, asset) = store_with_prices(&[100.0]);
        let mut portfolio = Portfolio::new(1_000.0);
        portfolio.apply_fill(&asset, 0, 100.0).unwrap();
        assert_eq!(portfolio.cash(), 1_000.0);
        assert!(!portfolio.has_positions());
    }
}
