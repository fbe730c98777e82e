//! Engine error taxonomy.
//!
//! `EngineError` covers everything the store, portfolio, and order engine can
//! reject. `DataError` is raised while bars are being loaded, before any run
//! starts. Failures inside user callbacks are wrapped by
//! [`SimError`](crate::engine::SimError) with the failing tick attached.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::AssetId;

/// Errors raised by the clock, history store, portfolio, and order engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error(
        "insufficient history for {symbol}: requested {requested} bars, \
         {available} available as of {as_of}"
    )]
    InsufficientHistory {
        symbol: String,
        requested: usize,
        available: usize,
        as_of: NaiveDateTime,
    },

    #[error("insufficient cash for {symbol}: order costs {required:.2}, {available:.2} available")]
    InsufficientCash {
        symbol: String,
        required: f64,
        available: f64,
    },

    #[error("invalid order for {symbol}: {reason}")]
    InvalidOrder { symbol: String, reason: String },

    #[error("unknown asset {0}")]
    UnknownAsset(AssetId),

    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
}

/// Errors raised while populating a history store.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("bar for {symbol} at {timestamp} is not after the previous bar at {last}")]
    OutOfOrder {
        symbol: String,
        timestamp: NaiveDateTime,
        last: NaiveDateTime,
    },

    #[error("invalid bar for {symbol} at {timestamp}: {reason}")]
    InvalidBar {
        symbol: String,
        timestamp: NaiveDateTime,
        reason: String,
    },

    #[error("unknown bar field '{0}'")]
    UnknownField(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
