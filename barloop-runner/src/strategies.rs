//! Built-in algorithms selectable from a config file.

use barloop_core::{
    Algorithm, BarData, BarField, CallbackResult, Context, EngineError,
};

use crate::config::AlgorithmConfig;

/// Build the algorithm a config names.
pub fn build_algorithm(config: &AlgorithmConfig) -> Box<dyn Algorithm + Send> {
    match config {
        AlgorithmConfig::BuyAndHold { symbol } => Box::new(BuyAndHold::new(symbol)),
        AlgorithmConfig::DualMovingAverage {
            symbol,
            short_window,
            long_window,
            shares,
        } => Box::new(DualMovingAverage::new(
            symbol,
            *short_window,
            *long_window,
            *shares,
        )),
        AlgorithmConfig::TargetPercent { symbol, fraction } => {
            Box::new(TargetPercent::new(symbol, *fraction))
        }
    }
}

/// Invest all cash on the first tradable tick and never trade again.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    symbol: String,
}

impl BuyAndHold {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
        }
    }
}

impl Algorithm for BuyAndHold {
    fn initialize(&mut self, context: &mut Context) -> CallbackResult {
        context.set("invested", false);
        Ok(())
    }

    fn handle_data(&mut self, context: &mut Context, data: &BarData<'_>) -> CallbackResult {
        let asset = data.symbol(&self.symbol)?;
        if !data.can_trade(&asset) {
            return Ok(());
        }
        if context.get_bool("invested") != Some(true) {
            context.order_target_percent(data, &asset, 1.0)?;
            context.set("invested", true);
        }
        context.record("price", data.current(&asset, BarField::Price)?);
        Ok(())
    }
}

/// Classic dual moving average crossover on the run's own frequency.
///
/// Nothing is ordered until `long_window` bars are visible.
#[derive(Debug, Clone)]
pub struct DualMovingAverage {
    symbol: String,
    short_window: usize,
    long_window: usize,
    shares: i64,
}

impl DualMovingAverage {
    pub fn new(symbol: &str, short_window: usize, long_window: usize, shares: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            short_window,
            long_window,
            shares,
        }
    }
}

impl Algorithm for DualMovingAverage {
    fn initialize(&mut self, context: &mut Context) -> CallbackResult {
        context.set("short_window", self.short_window);
        context.set("long_window", self.long_window);
        Ok(())
    }

    fn handle_data(&mut self, context: &mut Context, data: &BarData<'_>) -> CallbackResult {
        let asset = data.symbol(&self.symbol)?;
        let long = match data.history(&asset, BarField::Price, self.long_window) {
            Ok(values) => values,
            // Warm-up: not enough bars yet.
            Err(EngineError::InsufficientHistory { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let short = &long[long.len().saturating_sub(self.short_window)..];
        let short_mavg = mean(short);
        let long_mavg = mean(&long);

        let target = if short_mavg > long_mavg { self.shares } else { 0 };
        context.order_target(data, &asset, target)?;

        context.record("short_mavg", short_mavg);
        context.record("long_mavg", long_mavg);
        context.record("price", data.current(&asset, BarField::Price)?);
        Ok(())
    }
}

/// Hold a fixed fraction of portfolio value, rebalanced every tick.
#[derive(Debug, Clone)]
pub struct TargetPercent {
    symbol: String,
    fraction: f64,
}

impl TargetPercent {
    pub fn new(symbol: &str, fraction: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            fraction,
        }
    }
}

impl Algorithm for TargetPercent {
    fn initialize(&mut self, _context: &mut Context) -> CallbackResult {
        Ok(())
    }

    fn handle_data(&mut self, context: &mut Context, data: &BarData<'_>) -> CallbackResult {
        let asset = data.symbol(&self.symbol)?;
        if !data.can_trade(&asset) {
            return Ok(());
        }
        context.order_target_percent(data, &asset, self.fraction)?;
        context.record("price", data.current(&asset, BarField::Price)?);
        context.record("shares", context.portfolio().shares(asset.id()) as f64);
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use barloop_core::domain::Bar;
    use barloop_core::{Frequency, HistoryStore, RunParams, Simulation, TradingCalendar};
    use chrono::NaiveDate;

    fn store(prices: &[f64]) -> (HistoryStore, RunParams) {
        let calendar = TradingCalendar::all_days();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut store = HistoryStore::new();
        let asset = store.register("SPY");
        for (i, &p) in prices.iter().enumerate() {
            let day = start + chrono::Duration::days(i as i64);
            store
                .append(asset.id(), Frequency::Daily, Bar::flat(calendar.session_close(day), p, 1.0))
                .unwrap();
        }
        let end = start + chrono::Duration::days(prices.len() as i64 - 1);
        let params = RunParams::new(start, end, 10_000.0).with_calendar(calendar);
        (store, params)
    }

    fn simulate<A: Algorithm>(
        store: &HistoryStore,
        params: &RunParams,
        algo: A,
    ) -> barloop_core::PerformanceSeries {
        Simulation::new(store, params.clock().unwrap(), algo, params.initial_cash, false)
            .unwrap()
            .run()
            .unwrap()
    }

    #[test]
    fn buy_and_hold_trades_once() {
        let (store, params) = store(&[100.0, 110.0, 90.0, 120.0]);
        let series = simulate(&store, &params, BuyAndHold::new("spy"));
        assert_eq!(series.transactions().len(), 1);
        assert_eq!(series.transactions()[0].shares, 100);
        assert_eq!(series.final_value(), 12_000.0);
    }

    #[test]
    fn dual_moving_average_waits_for_warm_up() {
        let mut prices: Vec<f64> = (0..10).map(|i| 100.0 - i as f64).collect();
        prices.extend((0..10).map(|i| 91.0 + 3.0 * i as f64));
        let (store, params) = store(&prices);

        let series = simulate(&store, &params, DualMovingAverage::new("SPY", 3, 8, 10));
        let long = series.column("long_mavg").unwrap();
        assert!(long[..7].iter().all(Option::is_none));
        assert!(long[7..].iter().all(Option::is_some));
        assert_eq!(
            series.columns(),
            ["date", "portfolio_value", "cash", "short_mavg", "long_mavg", "price"]
        );
        // Falling prices keep it flat; the rally puts it long.
        let first = &series.transactions()[0];
        assert_eq!(first.shares, 10);
        assert!(first.tick_index >= 10);
    }

    #[test]
    fn target_percent_rebalances() {
        let (store, params) = store(&[100.0, 200.0]);
        let series = simulate(&store, &params, TargetPercent::new("SPY", 0.5));
        // Tick 0: 50 shares. Tick 1: value 15_000, target 7_500 / 200 = 37.
        assert_eq!(series.column("shares").unwrap(), vec![Some(50.0), Some(37.0)]);
        assert_eq!(series.transactions().len(), 2);
    }

    #[test]
    fn unknown_symbol_fails_the_run() {
        let (store, params) = store(&[100.0]);
        let err = Simulation::new(
            &store,
            params.clock().unwrap(),
            BuyAndHold::new("QQQ"),
            1_000.0,
            false,
        )
        .unwrap()
        .run()
        .unwrap_err();
        assert_eq!(
            err.engine_error(),
            Some(&EngineError::UnknownSymbol("QQQ".into()))
        );
    }

    #[test]
    fn build_algorithm_dispatches_on_type() {
        let (store, params) = store(&[100.0, 100.0]);
        let algo = build_algorithm(&AlgorithmConfig::TargetPercent {
            symbol: "SPY".into(),
            fraction: 1.0,
        });
        let series = simulate(&store, &params, algo);
        assert_eq!(series.transactions().len(), 1);
    }
}
