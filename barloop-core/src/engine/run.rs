//! One-call entry point for closure-based algorithms.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::algorithm::{CallbackResult, FnAlgorithm};
use super::context::Context;
use super::loop_runner::{SimError, Simulation};
use super::performance::PerformanceSeries;
use crate::clock::{Clock, Frequency, TradingCalendar};
use crate::data::{BarData, HistoryStore};
use crate::error::EngineError;

/// Parameters of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
    pub initial_cash: f64,
    #[serde(default)]
    pub allow_margin: bool,
    #[serde(default)]
    pub calendar: TradingCalendar,
}

fn default_frequency() -> Frequency {
    Frequency::Daily
}

impl RunParams {
    /// Daily bars on the default weekday calendar, no margin.
    pub fn new(start: NaiveDate, end: NaiveDate, initial_cash: f64) -> Self {
        Self {
            start,
            end,
            frequency: Frequency::Daily,
            initial_cash,
            allow_margin: false,
            calendar: TradingCalendar::default(),
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_margin(mut self, allow_margin: bool) -> Self {
        self.allow_margin = allow_margin;
        self
    }

    pub fn with_calendar(mut self, calendar: TradingCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn clock(&self) -> Result<Clock, EngineError> {
        Clock::new(self.calendar.clone(), self.start, self.end, self.frequency)
    }
}

/// Run `initialize` once and `handle_data` every tick, returning the series.
pub fn run<I, H>(
    store: &HistoryStore,
    initialize: I,
    handle_data: H,
    params: &RunParams,
) -> Result<PerformanceSeries, SimError>
where
    I: FnMut(&mut Context) -> CallbackResult,
    H: FnMut(&mut Context, &BarData<'_>) -> CallbackResult,
{
    let algorithm = FnAlgorithm::new(initialize, handle_data);
    Simulation::new(
        store,
        params.clock()?,
        algorithm,
        params.initial_cash,
        params.allow_margin,
    )?
    .run()
}
