//! Backtesting engine: context, order settlement, recording, and the
//! tick-by-tick simulation loop.
//!
//! A run owns one [`Context`] (portfolio, order engine, recorder, user state)
//! and borrows a read-only [`HistoryStore`](crate::data::HistoryStore). Each
//! clock tick produces exactly one [`PerformanceRow`].

pub mod algorithm;
pub mod context;
pub mod loop_runner;
pub mod orders;
pub mod performance;
pub mod recorder;
pub mod run;
pub mod state;

pub use algorithm::{Algorithm, CallbackError, CallbackResult, FnAlgorithm};
pub use context::Context;
pub use loop_runner::{SimError, Simulation};
pub use orders::OrderEngine;
pub use performance::{PerformanceRow, PerformanceSeries};
pub use recorder::Recorder;
pub use run::{run, RunParams};
pub use state::{Phase, RunState};
