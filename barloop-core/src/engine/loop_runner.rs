//! Tick-by-tick simulation loop: the heart of the backtesting engine.
//!
//! Per tick:
//! 1. Clear the recorder and point the context at the tick
//! 2. `before_trading_start` if the tick opens a session
//! 3. `handle_data` with a data view scoped to the tick timestamp
//! 4. Mark the portfolio to market and append a performance row
//!
//! Orders settle inside the callbacks that issue them. Nothing is caught: the
//! first callback error fails the run and is returned with the tick attached.

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::algorithm::{Algorithm, CallbackError};
use super::context::Context;
use super::performance::{PerformanceRow, PerformanceSeries};
use super::state::{Phase, RunState};
use crate::clock::{Clock, Tick, Ticks};
use crate::data::{BarData, HistoryStore};
use crate::error::EngineError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid run setup: {0}")]
    InvalidSetup(#[from] EngineError),

    #[error("{phase} failed at tick {tick_index}{}: {source}", fmt_at(.timestamp))]
    UserCallback {
        phase: Phase,
        tick_index: usize,
        timestamp: Option<NaiveDateTime>,
        source: CallbackError,
    },

    #[error("portfolio valuation failed at tick {tick_index} ({timestamp}): {source}")]
    Valuation {
        tick_index: usize,
        timestamp: NaiveDateTime,
        source: EngineError,
    },

    #[error("simulation already failed at tick {tick_index}")]
    AlreadyFailed { tick_index: usize },

    #[error("simulation incomplete: {ticks_run} of {ticks_total} ticks run")]
    Incomplete { ticks_run: usize, ticks_total: usize },
}

fn fmt_at(timestamp: &Option<NaiveDateTime>) -> String {
    timestamp.map(|ts| format!(" ({ts})")).unwrap_or_default()
}

impl SimError {
    /// The engine error behind this failure, if there is one.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            SimError::InvalidSetup(e) => Some(e),
            SimError::UserCallback { source, .. } => source.downcast_ref::<EngineError>(),
            SimError::Valuation { source, .. } => Some(source),
            SimError::AlreadyFailed { .. } | SimError::Incomplete { .. } => None,
        }
    }

    pub fn tick_index(&self) -> Option<usize> {
        match self {
            SimError::UserCallback { tick_index, .. }
            | SimError::Valuation { tick_index, .. }
            | SimError::AlreadyFailed { tick_index } => Some(*tick_index),
            SimError::InvalidSetup(_) | SimError::Incomplete { .. } => None,
        }
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SimError::UserCallback { timestamp, .. } => *timestamp,
            SimError::Valuation { timestamp, .. } => Some(*timestamp),
            _ => None,
        }
    }
}

/// One run of an algorithm over a clock against a shared store.
pub struct Simulation<'a, A> {
    store: &'a HistoryStore,
    clock: Clock,
    ticks: Ticks,
    ticks_total: usize,
    algorithm: A,
    context: Context,
    series: PerformanceSeries,
    state: RunState,
}

impl<'a, A: Algorithm> Simulation<'a, A> {
    pub fn new(
        store: &'a HistoryStore,
        clock: Clock,
        algorithm: A,
        starting_cash: f64,
        allow_margin: bool,
    ) -> Result<Self, SimError> {
        if !starting_cash.is_finite() {
            return Err(EngineError::InvalidRange(format!(
                "starting cash must be finite, got {starting_cash}"
            ))
            .into());
        }
        let ticks_total = clock.len();
        Ok(Self {
            store,
            ticks: clock.ticks(),
            series: PerformanceSeries::new(clock.frequency(), starting_cash, ticks_total),
            clock,
            ticks_total,
            algorithm,
            context: Context::new(starting_cash, allow_margin),
            state: RunState::NotStarted,
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Rows appended so far.
    pub fn series(&self) -> &PerformanceSeries {
        &self.series
    }

    pub fn ticks_run(&self) -> usize {
        self.series.len()
    }

    pub fn ticks_total(&self) -> usize {
        self.ticks_total
    }

    /// Advance one tick. `Ok(None)` once the clock is exhausted.
    ///
    /// The first call runs `initialize` before processing tick 0.
    pub fn step(&mut self) -> Result<Option<&PerformanceRow>, SimError> {
        match &self.state {
            RunState::Completed => return Ok(None),
            RunState::Failed { tick_index, .. } => {
                return Err(SimError::AlreadyFailed {
                    tick_index: *tick_index,
                })
            }
            RunState::NotStarted => self.start()?,
            RunState::Running { .. } => {}
        }

        let Some(tick) = self.ticks.next() else {
            self.complete();
            return Ok(None);
        };
        self.process(tick)?;
        if tick.index + 1 == self.ticks_total {
            self.complete();
        } else {
            self.state = RunState::Running {
                next_tick: tick.index + 1,
            };
        }
        Ok(self.series.rows().last())
    }

    /// Step until the clock is exhausted or a tick fails.
    pub fn run_to_completion(&mut self) -> Result<(), SimError> {
        while self.step()?.is_some() {}
        Ok(())
    }

    /// Drive the whole run and hand back the series.
    pub fn run(mut self) -> Result<PerformanceSeries, SimError> {
        self.run_to_completion()?;
        self.finish()
    }

    /// The series of a completed run. Partial series are never returned.
    pub fn finish(self) -> Result<PerformanceSeries, SimError> {
        self.finish_with_context().map(|(series, _)| series)
    }

    /// Like [`finish`](Self::finish), also returning the final context.
    pub fn finish_with_context(self) -> Result<(PerformanceSeries, Context), SimError> {
        match self.state {
            RunState::Completed => Ok((self.series, self.context)),
            RunState::Failed { tick_index, .. } => Err(SimError::AlreadyFailed { tick_index }),
            RunState::NotStarted | RunState::Running { .. } => Err(SimError::Incomplete {
                ticks_run: self.series.len(),
                ticks_total: self.ticks_total,
            }),
        }
    }

    fn start(&mut self) -> Result<(), SimError> {
        info!(
            start = %self.clock.start(),
            end = %self.clock.end(),
            frequency = %self.clock.frequency(),
            ticks = self.ticks_total,
            starting_cash = self.context.portfolio().starting_cash(),
            "simulation started"
        );
        self.context.begin_tick(0);
        if let Err(source) = self.algorithm.initialize(&mut self.context) {
            return Err(self.fail(Phase::Initialize, 0, None, source));
        }
        self.state = RunState::Running { next_tick: 0 };
        Ok(())
    }

    fn process(&mut self, tick: Tick) -> Result<(), SimError> {
        self.context.begin_tick(tick.index);
        let data = BarData::new(self.store, tick.timestamp, self.clock.frequency());

        if tick.session_start {
            if let Err(source) = self
                .algorithm
                .before_trading_start(&mut self.context, &data)
            {
                return Err(self.fail(
                    Phase::BeforeTradingStart,
                    tick.index,
                    Some(tick.timestamp),
                    source,
                ));
            }
        }
        if let Err(source) = self.algorithm.handle_data(&mut self.context, &data) {
            return Err(self.fail(Phase::HandleData, tick.index, Some(tick.timestamp), source));
        }

        let portfolio = self.context.portfolio();
        let value = match portfolio.value(self.store, tick.timestamp) {
            Ok(value) => value,
            Err(source) => {
                self.state = RunState::Failed {
                    tick_index: tick.index,
                    timestamp: Some(tick.timestamp),
                    cause: source.to_string(),
                };
                warn!(tick = tick.index, timestamp = %tick.timestamp, error = %source, "valuation failed");
                return Err(SimError::Valuation {
                    tick_index: tick.index,
                    timestamp: tick.timestamp,
                    source,
                });
            }
        };
        let cash = portfolio.cash();
        let recorded = self.context.take_recorded();
        let fills = self.context.take_fills();
        debug!(
            tick = tick.index,
            timestamp = %tick.timestamp,
            portfolio_value = value,
            cash,
            fills = fills.len(),
            "tick processed"
        );
        self.series.push(tick.timestamp, value, cash, recorded, fills);
        Ok(())
    }

    fn complete(&mut self) {
        if self.state == RunState::Completed {
            return;
        }
        self.state = RunState::Completed;
        info!(
            ticks = self.series.len(),
            fills = self.series.transactions().len(),
            final_value = self.series.final_value(),
            "simulation completed"
        );
    }

    fn fail(
        &mut self,
        phase: Phase,
        tick_index: usize,
        timestamp: Option<NaiveDateTime>,
        source: CallbackError,
    ) -> SimError {
        warn!(
            %phase,
            tick = tick_index,
            timestamp = ?timestamp,
            error = %source,
            "simulation failed"
        );
        self.state = RunState::Failed {
            tick_index,
            timestamp,
            cause: source.to_string(),
        };
        SimError::UserCallback {
            phase,
            tick_index,
            timestamp,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Frequency, TradingCalendar};
    use crate::domain::{Bar, BarField};
    use crate::engine::algorithm::{CallbackResult, FnAlgorithm};
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn store(days: u32) -> HistoryStore {
        let calendar = TradingCalendar::all_days();
        let mut store = HistoryStore::new();
        let asset = store.register("SPY");
        for day in 1..=days {
            store
                .append(
                    asset.id(),
                    Frequency::Daily,
                    Bar::flat(calendar.session_close(date(day)), 10.0 + day as f64, 1.0),
                )
                .unwrap();
        }
        store
    }

    fn clock(days: u32) -> Clock {
        Clock::new(TradingCalendar::all_days(), date(1), date(days), Frequency::Daily).unwrap()
    }

    struct Sessions {
        sessions: usize,
        handled: usize,
    }

    impl Algorithm for Sessions {
        fn initialize(&mut self, context: &mut Context) -> CallbackResult {
            context.set("initialized", true);
            Ok(())
        }

        fn before_trading_start(&mut self, _: &mut Context, _: &BarData<'_>) -> CallbackResult {
            self.sessions += 1;
            Ok(())
        }

        fn handle_data(&mut self, context: &mut Context, _: &BarData<'_>) -> CallbackResult {
            self.handled += 1;
            context.record("handled", self.handled as f64);
            Ok(())
        }
    }

    #[test]
    fn step_walks_the_state_machine() {
        let store = store(3);
        let algo = Sessions { sessions: 0, handled: 0 };
        let mut sim = Simulation::new(&store, clock(3), algo, 100.0, false).unwrap();
        assert_eq!(sim.state(), &RunState::NotStarted);

        let row = sim.step().unwrap().unwrap();
        assert_eq!(row.index, 0);
        assert_eq!(row.recorded.get("handled"), Some(&1.0));
        assert_eq!(sim.state(), &RunState::Running { next_tick: 1 });
        assert_eq!(sim.context().get_bool("initialized"), Some(true));

        sim.step().unwrap();
        sim.step().unwrap();
        assert_eq!(sim.state(), &RunState::Completed);
        assert!(sim.step().unwrap().is_none());

        let (series, _) = sim.finish_with_context().unwrap();
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn before_trading_start_runs_once_per_session() {
        let store = store(2);
        let calendar = TradingCalendar::all_days();
        let clock = Clock::new(calendar, date(1), date(2), Frequency::Minute).unwrap();
        let mut sim = Simulation::new(
            &store,
            clock,
            Sessions { sessions: 0, handled: 0 },
            100.0,
            false,
        )
        .unwrap();
        sim.run_to_completion().unwrap();
        assert_eq!(sim.algorithm.sessions, 2);
        assert_eq!(sim.algorithm.handled, 780);
    }

    #[test]
    fn finish_before_completion_is_incomplete() {
        let store = store(3);
        let mut sim = Simulation::new(
            &store,
            clock(3),
            Sessions { sessions: 0, handled: 0 },
            100.0,
            false,
        )
        .unwrap();
        sim.step().unwrap();
        let err = sim.finish().unwrap_err();
        assert!(matches!(err, SimError::Incomplete { ticks_run: 1, ticks_total: 3 }));
    }

    #[test]
    fn callback_error_fails_the_run_with_its_tick() {
        let store = store(5);
        let algo = FnAlgorithm::new(
            |_: &mut Context| Ok(()),
            |ctx: &mut Context, data: &BarData<'_>| {
                let asset = data.symbol("SPY")?;
                if ctx.tick_index() == 2 {
                    data.history(&asset, BarField::Price, 300)?;
                }
                Ok(())
            },
        );
        let mut sim = Simulation::new(&store, clock(5), algo, 100.0, false).unwrap();
        let err = sim.run_to_completion().unwrap_err();

        assert_eq!(err.tick_index(), Some(2));
        assert_eq!(
            err.timestamp(),
            Some(TradingCalendar::all_days().session_close(date(3)))
        );
        assert!(matches!(
            err.engine_error(),
            Some(EngineError::InsufficientHistory { requested: 300, available: 3, .. })
        ));
        assert!(matches!(sim.state(), RunState::Failed { tick_index: 2, .. }));
        assert!(matches!(
            sim.step().unwrap_err(),
            SimError::AlreadyFailed { tick_index: 2 }
        ));
        assert!(matches!(sim.finish(), Err(SimError::AlreadyFailed { .. })));
    }

    #[test]
    fn initialize_failure_has_no_timestamp() {
        let store = store(1);
        let algo = FnAlgorithm::new(
            |_: &mut Context| Err("boom".into()),
            |_: &mut Context, _: &BarData<'_>| Ok(()),
        );
        let err = Simulation::new(&store, clock(1), algo, 100.0, false)
            .unwrap()
            .run()
            .unwrap_err();
        match err {
            SimError::UserCallback { phase, tick_index, timestamp, .. } => {
                assert_eq!(phase, Phase::Initialize);
                assert_eq!(tick_index, 0);
                assert_eq!(timestamp, None);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_clock_completes_with_no_rows() {
        let store = store(1);
        let calendar = TradingCalendar::weekdays();
        // 2024-01-06/07 is a weekend.
        let clock = Clock::new(calendar, date(6), date(7), Frequency::Daily).unwrap();
        let sim = Simulation::new(&store, clock, Sessions { sessions: 0, handled: 0 }, 100.0, false)
            .unwrap();
        let series = sim.run().unwrap();
        assert!(series.is_empty());
    }
}
