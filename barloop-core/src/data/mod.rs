//! Bar storage and the per-tick data view

pub mod store;
pub mod view;

pub use store::HistoryStore;
pub use view::BarData;
