use serde::{Deserialize, Serialize};

use super::asset::AssetId;
use crate::error::EngineError;

/// Position tracking: signed whole shares plus average entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub asset: AssetId,
    pub symbol: String,
    pub shares: i64,
    pub cost_basis: f64,
}

impl Position {
    pub fn new(asset: AssetId, symbol: String) -> Self {
        Self {
            asset,
            symbol,
            shares: 0,
            cost_basis: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.shares > 0
    }

    pub fn is_short(&self) -> bool {
        self.shares < 0
    }

    pub fn is_flat(&self) -> bool {
        self.shares == 0
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.shares as f64 * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.shares as f64 * (current_price - self.cost_basis)
    }

    /// Apply a signed share delta filled at `price`.
    ///
    /// Adding to a position averages the basis, reducing it keeps the basis,
    /// and crossing through zero starts a fresh basis at the fill price.
    /// A share count outside `i64` is rejected and leaves the position as is.
    pub fn apply(&mut self, delta: i64, price: f64) -> Result<(), EngineError> {
        let old = self.shares;
        let new = old
            .checked_add(delta)
            .ok_or_else(|| EngineError::InvalidOrder {
                symbol: self.symbol.clone(),
                reason: format!("{old} + {delta} shares overflows the position"),
            })?;

        self.cost_basis = if new == 0 {
            0.0
        } else if old == 0 || old.signum() != new.signum() {
            price
        } else if delta.signum() == old.signum() {
            let old_abs = old.unsigned_abs() as f64;
            let delta_abs = delta.unsigned_abs() as f64;
            (self.cost_basis * old_abs + price * delta_abs) / (old_abs + delta_abs)
        } else {
            self.cost_basis
        };
        self.shares = new;
        Ok(())
    }
}
