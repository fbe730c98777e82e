//! Domain types for barloop

pub mod asset;
pub mod bar;
pub mod fill;
pub mod ids;
pub mod order;
pub mod portfolio;
pub mod position;

pub use asset::{normalize_symbol, Asset, AssetId};
pub use bar::{Bar, BarField};
pub use fill::Fill;
pub use ids::{ConfigId, DatasetHash, OrderId, RunId};
pub use order::{Order, OrderTarget};
pub use portfolio::Portfolio;
pub use position::Position;
