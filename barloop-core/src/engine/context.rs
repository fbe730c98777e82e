//! Context: the state handed to every user callback.
//!
//! Engine-owned state lives in named fields (portfolio, order engine,
//! recorder, tick position). Anything the algorithm wants to carry between
//! ticks goes in the open user map as `serde_json::Value`s.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use super::orders::OrderEngine;
use super::recorder::Recorder;
use crate::data::BarData;
use crate::domain::{Asset, Fill, OrderTarget, Portfolio};
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Context {
    portfolio: Portfolio,
    orders: OrderEngine,
    recorder: Recorder,
    tick_index: usize,
    user: BTreeMap<String, Value>,
}

impl Context {
    pub fn new(starting_cash: f64, allow_margin: bool) -> Self {
        Self {
            portfolio: Portfolio::new(starting_cash),
            orders: OrderEngine::new(allow_margin),
            recorder: Recorder::new(),
            tick_index: 0,
            user: BTreeMap::new(),
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Index of the tick currently being processed.
    pub fn tick_index(&self) -> usize {
        self.tick_index
    }

    pub fn allow_margin(&self) -> bool {
        self.orders.allow_margin()
    }

    /// Fills settled during the current tick.
    pub fn fills(&self) -> &[Fill] {
        self.orders.fills()
    }

    // --- orders ---

    /// Trade `shares` relative to the current position.
    pub fn order(
        &mut self,
        data: &BarData<'_>,
        asset: &Asset,
        shares: i64,
    ) -> Result<Option<Fill>, EngineError> {
        self.submit(data, asset, OrderTarget::Amount(shares))
    }

    /// Move the position to exactly `target_shares`.
    pub fn order_target(
        &mut self,
        data: &BarData<'_>,
        asset: &Asset,
        target_shares: i64,
    ) -> Result<Option<Fill>, EngineError> {
        self.submit(data, asset, OrderTarget::Shares(target_shares))
    }

    /// Move the position to `fraction` of current portfolio value, in whole
    /// shares rounded toward zero.
    pub fn order_target_percent(
        &mut self,
        data: &BarData<'_>,
        asset: &Asset,
        fraction: f64,
    ) -> Result<Option<Fill>, EngineError> {
        self.submit(data, asset, OrderTarget::Percent(fraction))
    }

    pub fn order_target_value(
        &mut self,
        data: &BarData<'_>,
        asset: &Asset,
        value: f64,
    ) -> Result<Option<Fill>, EngineError> {
        self.submit(data, asset, OrderTarget::Value(value))
    }

    fn submit(
        &mut self,
        data: &BarData<'_>,
        asset: &Asset,
        target: OrderTarget,
    ) -> Result<Option<Fill>, EngineError> {
        self.orders
            .submit(&mut self.portfolio, data, self.tick_index, asset, target)
    }

    // --- recorder ---

    pub fn record(&mut self, key: impl Into<String>, value: f64) {
        self.recorder.record(key, value);
    }

    pub fn recorded(&self, key: &str) -> Option<f64> {
        self.recorder.get(key)
    }

    // --- user state ---

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.user.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.user.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.user.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.user.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.user.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.user.get(key).and_then(Value::as_str)
    }

    /// Deserialize a stored value into `T`. `None` if absent or mismatched.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.user
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.user.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.user.contains_key(key)
    }

    /// Add 1 to an integer counter, starting from 0. Returns the new count.
    pub fn increment(&mut self, key: &str) -> i64 {
        let next = self.get_i64(key).unwrap_or(0) + 1;
        self.user.insert(key.to_string(), Value::from(next));
        next
    }

    pub fn user_keys(&self) -> impl Iterator<Item = &str> {
        self.user.keys().map(String::as_str)
    }

    // --- engine-side hooks ---

    pub(crate) fn begin_tick(&mut self, tick_index: usize) {
        self.tick_index = tick_index;
        self.recorder.clear();
    }

    pub(crate) fn take_recorded(&mut self) -> Vec<(String, f64)> {
        self.recorder.take()
    }

    pub(crate) fn take_fills(&mut self) -> Vec<Fill> {
        self.orders.take_fills()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn user_values_round_trip_through_accessors() {
        let mut ctx = Context::new(1_000.0, false);
        ctx.set("invested", false);
        ctx.set("window", 20);
        ctx.set("threshold", 0.5);
        ctx.set("asset", "SPY");

        assert_eq!(ctx.get_bool("invested"), Some(false));
        assert_eq!(ctx.get_i64("window"), Some(20));
        assert_eq!(ctx.get_f64("threshold"), Some(0.5));
        assert_eq!(ctx.get_str("asset"), Some("SPY"));
        assert_eq!(ctx.get_i64("asset"), None);
        assert!(ctx.contains("window"));
        assert!(ctx.remove("window").is_some());
        assert!(!ctx.contains("window"));
    }

    #[test]
    fn get_as_deserializes_structured_values() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Windows {
            short: usize,
            long: usize,
        }

        let mut ctx = Context::new(0.0, false);
        ctx.set("windows", serde_json::json!({ "short": 100, "long": 300 }));
        assert_eq!(
            ctx.get_as::<Windows>("windows"),
            Some(Windows { short: 100, long: 300 })
        );
        assert_eq!(ctx.get_as::<Windows>("missing"), None);
    }

    #[test]
    fn increment_counts_from_zero() {
        let mut ctx = Context::new(0.0, false);
        assert_eq!(ctx.increment("i"), 1);
        assert_eq!(ctx.increment("i"), 2);
        assert_eq!(ctx.get_i64("i"), Some(2));
    }

    #[test]
    fn begin_tick_clears_recorder() {
        let mut ctx = Context::new(0.0, false);
        ctx.begin_tick(3);
        ctx.record("x", 1.0);
        assert_eq!(ctx.recorded("x"), Some(1.0));
        ctx.begin_tick(4);
        assert_eq!(ctx.tick_index(), 4);
        assert_eq!(ctx.recorded("x"), None);
    }
}
