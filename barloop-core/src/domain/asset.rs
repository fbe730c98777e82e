//! Assets: tradable symbols with a stable internal id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense internal asset id, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u32);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered asset. Immutable once created; only the history store mints them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    id: AssetId,
    symbol: String,
}

impl Asset {
    pub(crate) fn new(id: AssetId, symbol: String) -> Self {
        Self { id, symbol }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Canonical form of a ticker: trimmed and upper-cased.
pub fn normalize_symbol(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}
