//! Orders: transient intents resolved within the tick that creates them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::asset::AssetId;
use super::ids::OrderId;

/// What the order asks for. Everything except `Amount` names a resulting position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OrderTarget {
    /// Trade this many shares relative to the current position.
    Amount(i64),
    /// End with exactly this many shares.
    Shares(i64),
    /// End with this fraction of portfolio value invested.
    Percent(f64),
    /// End with this much market value invested.
    Value(f64),
}

impl fmt::Display for OrderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderTarget::Amount(n) => write!(f, "amount {n:+}"),
            OrderTarget::Shares(n) => write!(f, "target {n} shares"),
            OrderTarget::Percent(p) => write!(f, "target {:.2}%", p * 100.0),
            OrderTarget::Value(v) => write!(f, "target value {v:.2}"),
        }
    }
}

/// An order as created by the order engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub asset: AssetId,
    pub target: OrderTarget,
    pub created_at: NaiveDateTime,
    pub tick_index: usize,
}
