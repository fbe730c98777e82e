//! History store: append-only bar series per asset and frequency.
//!
//! Loaded once before a run and read-only afterwards, so a single store can be
//! shared by reference across concurrent simulations. Every query takes an
//! explicit `as_of`; a bar is visible iff `bar.timestamp <= as_of`.

use chrono::NaiveDateTime;
use std::collections::HashMap;

use crate::clock::Frequency;
use crate::domain::{normalize_symbol, Asset, AssetId, Bar, BarField};
use crate::error::{DataError, EngineError};

#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    assets: Vec<Asset>,
    by_symbol: HashMap<String, AssetId>,
    series: HashMap<(AssetId, Frequency), Vec<Bar>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ticker, returning the existing asset if already known.
    pub fn register(&mut self, ticker: &str) -> Asset {
        let symbol = normalize_symbol(ticker);
        if let Some(&id) = self.by_symbol.get(&symbol) {
            return self.assets[id.0 as usize].clone();
        }
        let id = AssetId(self.assets.len() as u32);
        let asset = Asset::new(id, symbol.clone());
        self.assets.push(asset.clone());
        self.by_symbol.insert(symbol, id);
        asset
    }

    /// Append one bar. Timestamps must be strictly increasing per series.
    pub fn append(
        &mut self,
        asset: AssetId,
        frequency: Frequency,
        bar: Bar,
    ) -> Result<(), DataError> {
        let symbol = self.asset(asset)?.symbol().to_string();
        if !bar.is_sane() {
            return Err(DataError::InvalidBar {
                symbol,
                timestamp: bar.timestamp,
                reason: format!(
                    "non-finite or inconsistent OHLCV (o={} h={} l={} c={} v={})",
                    bar.open, bar.high, bar.low, bar.close, bar.volume
                ),
            });
        }
        let series = self.series.entry((asset, frequency)).or_default();
        if let Some(last) = series.last() {
            if bar.timestamp <= last.timestamp {
                return Err(DataError::OutOfOrder {
                    symbol,
                    timestamp: bar.timestamp,
                    last: last.timestamp,
                });
            }
        }
        series.push(bar);
        Ok(())
    }

    pub fn extend(
        &mut self,
        asset: AssetId,
        frequency: Frequency,
        bars: impl IntoIterator<Item = Bar>,
    ) -> Result<(), DataError> {
        bars.into_iter()
            .try_for_each(|bar| self.append(asset, frequency, bar))
    }

    /// Look up a ticker.
    pub fn symbol(&self, ticker: &str) -> Result<Asset, EngineError> {
        let symbol = normalize_symbol(ticker);
        self.by_symbol
            .get(&symbol)
            .map(|&id| self.assets[id.0 as usize].clone())
            .ok_or(EngineError::UnknownSymbol(symbol))
    }

    pub fn asset(&self, id: AssetId) -> Result<&Asset, EngineError> {
        self.assets
            .get(id.0 as usize)
            .ok_or(EngineError::UnknownAsset(id))
    }

    /// True if `asset` is this store's registration of that id and symbol.
    pub fn contains(&self, asset: &Asset) -> bool {
        self.assets.get(asset.id().0 as usize) == Some(asset)
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn frequencies(&self, asset: AssetId) -> Vec<Frequency> {
        Frequency::ALL
            .into_iter()
            .filter(|f| self.series.contains_key(&(asset, *f)))
            .collect()
    }

    pub fn bar_count(&self, asset: AssetId, frequency: Frequency) -> usize {
        self.series.get(&(asset, frequency)).map_or(0, Vec::len)
    }

    pub fn last_timestamp(&self, asset: AssetId, frequency: Frequency) -> Option<NaiveDateTime> {
        self.series
            .get(&(asset, frequency))
            .and_then(|series| series.last())
            .map(|bar| bar.timestamp)
    }

    /// First and last timestamps of a series.
    pub fn date_range(
        &self,
        asset: AssetId,
        frequency: Frequency,
    ) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let series = self.series.get(&(asset, frequency))?;
        Some((series.first()?.timestamp, series.last()?.timestamp))
    }

    /// Bars of one series visible as of `as_of`.
    pub fn bars(
        &self,
        asset: AssetId,
        frequency: Frequency,
        as_of: NaiveDateTime,
    ) -> Result<&[Bar], EngineError> {
        self.asset(asset)?;
        let series = match self.series.get(&(asset, frequency)) {
            Some(series) => series.as_slice(),
            None => return Ok(&[]),
        };
        let visible = series.partition_point(|bar| bar.timestamp <= as_of);
        Ok(&series[..visible])
    }

    /// The last `bar_count` values of `field`, ending at `as_of` inclusive.
    ///
    /// Never pads: fewer visible bars than requested is an error.
    pub fn history(
        &self,
        asset: AssetId,
        field: BarField,
        bar_count: usize,
        frequency: Frequency,
        as_of: NaiveDateTime,
    ) -> Result<Vec<f64>, EngineError> {
        let visible = self.bars(asset, frequency, as_of)?;
        if visible.len() < bar_count {
            return Err(EngineError::InsufficientHistory {
                symbol: self.asset(asset)?.symbol().to_string(),
                requested: bar_count,
                available: visible.len(),
                as_of,
            });
        }
        Ok(visible[visible.len() - bar_count..]
            .iter()
            .map(|bar| bar.field(field))
            .collect())
    }

    /// The latest bar at or before `as_of` across all of the asset's series.
    pub fn current_bar(&self, asset: AssetId, as_of: NaiveDateTime) -> Result<&Bar, EngineError> {
        let mut latest: Option<&Bar> = None;
        for frequency in Frequency::ALL {
            if let Some(bar) = self.bars(asset, frequency, as_of)?.last() {
                if latest.map_or(true, |l| bar.timestamp > l.timestamp) {
                    latest = Some(bar);
                }
            }
        }
        latest.ok_or_else(|| EngineError::InsufficientHistory {
            symbol: self
                .assets
                .get(asset.0 as usize)
                .map(|a| a.symbol().to_string())
                .unwrap_or_default(),
            requested: 1,
            available: 0,
            as_of,
        })
    }

    /// Field value on the bar at or immediately preceding `as_of`.
    pub fn current(
        &self,
        asset: AssetId,
        field: BarField,
        as_of: NaiveDateTime,
    ) -> Result<f64, EngineError> {
        Ok(self.current_bar(asset, as_of)?.field(field))
    }

    /// BLAKE3 content hash over every registered asset and series.
    ///
    /// Symbols and series are length-prefixed so adjacent entries cannot
    /// run together.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for asset in &self.assets {
            let symbol = asset.symbol().as_bytes();
            hasher.update(&(symbol.len() as u64).to_le_bytes());
            hasher.update(symbol);
            for frequency in Frequency::ALL {
                let Some(series) = self.series.get(&(asset.id(), frequency)) else {
                    continue;
                };
                hasher.update(frequency.as_str().as_bytes());
                hasher.update(&(series.len() as u64).to_le_bytes());
                for bar in series {
                    hasher.update(&bar.timestamp.and_utc().timestamp().to_le_bytes());
                    for value in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
                        hasher.update(&value.to_le_bytes());
                    }
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}
