//! Order engine: resolves target orders at the current price and settles
//! them into the portfolio immediately.
//!
//! There is no book: every order is created, priced, and filled within the
//! tick that submits it, with no partial fills, slippage, or commission.

use tracing::debug;

use crate::data::BarData;
use crate::domain::{Asset, BarField, Fill, Order, OrderId, OrderTarget, Portfolio};
use crate::error::EngineError;

/// Relative tolerance for the no-margin cash check, so a target that spends
/// exactly all cash is not rejected over float rounding.
const CASH_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct OrderEngine {
    allow_margin: bool,
    next_id: u64,
    fills: Vec<Fill>,
}

impl OrderEngine {
    pub fn new(allow_margin: bool) -> Self {
        Self {
            allow_margin,
            next_id: 0,
            fills: Vec::new(),
        }
    }

    pub fn allow_margin(&self) -> bool {
        self.allow_margin
    }

    /// Fills settled since the loop last collected them, in order.
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn take_fills(&mut self) -> Vec<Fill> {
        std::mem::take(&mut self.fills)
    }

    /// Resolve `target` for `asset` at `data.as_of()` and settle it.
    ///
    /// Returns `Ok(None)` when the position already matches the target.
    pub fn submit(
        &mut self,
        portfolio: &mut Portfolio,
        data: &BarData<'_>,
        tick_index: usize,
        asset: &Asset,
        target: OrderTarget,
    ) -> Result<Option<Fill>, EngineError> {
        let store = data.store();
        if !store.contains(asset) {
            return Err(EngineError::UnknownAsset(asset.id()));
        }
        let invalid = |reason: String| EngineError::InvalidOrder {
            symbol: asset.symbol().to_string(),
            reason,
        };
        match target {
            OrderTarget::Percent(x) | OrderTarget::Value(x) if !x.is_finite() => {
                return Err(invalid(format!("non-finite order target {target}")));
            }
            _ => {}
        }

        let as_of = data.as_of();
        let price = store.current(asset.id(), BarField::Price, as_of)?;
        let current = portfolio.shares(asset.id());

        let target_shares = match target {
            OrderTarget::Amount(n) => current
                .checked_add(n)
                .ok_or_else(|| invalid(format!("{current} + {n} shares overflows")))?,
            OrderTarget::Shares(n) => n,
            OrderTarget::Percent(fraction) => {
                shares_for_value(fraction * portfolio.value(store, as_of)?, price)
                    .ok_or_else(|| invalid(format!("order target {target} is out of range")))?
            }
            OrderTarget::Value(value) => shares_for_value(value, price)
                .ok_or_else(|| invalid(format!("order target {target} is out of range")))?,
        };
        let delta = target_shares
            .checked_sub(current)
            .ok_or_else(|| invalid(format!("{target_shares} - {current} shares overflows")))?;
        if delta == 0 {
            return Ok(None);
        }

        let cost = delta as f64 * price;
        let cash = portfolio.cash();
        if !self.allow_margin && cost > 0.0 && cash - cost < -CASH_EPSILON * cost.max(1.0) {
            return Err(EngineError::InsufficientCash {
                symbol: asset.symbol().to_string(),
                required: cost,
                available: cash,
            });
        }

        let order = Order {
            id: OrderId(self.next_id),
            asset: asset.id(),
            target,
            created_at: as_of,
            tick_index,
        };
        portfolio.apply_fill(asset, delta, price)?;
        self.next_id += 1;
        let fill = Fill::from_order(&order, asset.symbol(), delta, price);
        debug!(
            order = %order.id,
            symbol = asset.symbol(),
            target = %order.target,
            shares = delta,
            price,
            cash = portfolio.cash(),
            "order filled"
        );
        self.fills.push(fill.clone());
        Ok(Some(fill))
    }
}

/// Whole shares worth `value` at `price`, rounded toward zero.
///
/// An unusable price buys nothing. `None` when the share count does not fit
/// in an `i64`.
fn shares_for_value(value: f64, price: f64) -> Option<i64> {
    if !price.is_finite() || price <= 0.0 {
        return Some(0);
    }
    let shares = (value / price).trunc();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    (shares.is_finite() && shares >= i64::MIN as f64 && shares < i64::MAX as f64)
        .then_some(shares as i64)
}
