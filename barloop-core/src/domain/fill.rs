use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::asset::AssetId;
use super::ids::OrderId;
use super::order::Order;

/// Fill record: the settlement of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub asset: AssetId,
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub tick_index: usize,
    /// Signed share delta (positive = bought).
    pub shares: i64,
    pub price: f64,
}

impl Fill {
    pub fn from_order(order: &Order, symbol: &str, shares: i64, price: f64) -> Self {
        Self {
            order_id: order.id,
            asset: order.asset,
            symbol: symbol.to_string(),
            timestamp: order.created_at,
            tick_index: order.tick_index,
            shares,
            price,
        }
    }

    /// Signed cash cost of the fill (negative for sells).
    pub fn notional(&self) -> f64 {
        self.shares as f64 * self.price
    }
}
