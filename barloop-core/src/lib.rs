//! Barloop Core: calendar, history store, portfolio, target orders, and the
//! `initialize` / `handle_data` simulation loop.
//!
//! This crate contains the heart of the backtesting engine:
//! - Domain types (assets, bars, orders, fills, positions, portfolio)
//! - Trading calendar and a restartable tick clock (daily or minute)
//! - Append-only history store with `as_of`-scoped queries
//! - Immediate-settlement order engine for target orders
//! - Tick-by-tick simulation loop with per-tick recording

pub mod clock;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;

pub use clock::{Clock, Frequency, SessionKind, Tick, TradingCalendar};
pub use data::{BarData, HistoryStore};
pub use domain::{Asset, AssetId, Bar, BarField, Fill, OrderTarget, Portfolio, Position};
pub use engine::{
    run, Algorithm, CallbackError, CallbackResult, Context, FnAlgorithm, PerformanceRow,
    PerformanceSeries, Phase, RunParams, RunState, SimError, Simulation,
};
pub use error::{DataError, EngineError};
