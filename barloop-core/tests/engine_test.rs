//! End-to-end tests of the simulation loop through the public `run` entry point.

use barloop_core::{
    run, BarData, BarField, Context, EngineError, Frequency, HistoryStore, Phase, RunParams,
    SimError, TradingCalendar,
};
use barloop_core::domain::Bar;
use chrono::{NaiveDate, NaiveDateTime};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// One daily bar per calendar day from `start`, stamped at the session close.
fn daily_store(symbol: &str, start: NaiveDate, prices: &[f64]) -> HistoryStore {
    let calendar = TradingCalendar::all_days();
    let mut store = HistoryStore::new();
    let asset = store.register(symbol);
    for (i, &price) in prices.iter().enumerate() {
        let day = start + chrono::Duration::days(i as i64);
        store
            .append(
                asset.id(),
                Frequency::Daily,
                Bar::flat(calendar.session_close(day), price, 1_000.0),
            )
            .unwrap();
    }
    store
}

fn all_days(start: NaiveDate, end: NaiveDate, cash: f64) -> RunParams {
    RunParams::new(start, end, cash).with_calendar(TradingCalendar::all_days())
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn order_target_on_tick_two_only() {
    let store = daily_store("AAPL", d(2013, 1, 1), &[10.0; 5]);
    let params = all_days(d(2013, 1, 1), d(2013, 1, 5), 1_000.0);

    let series = run(
        &store,
        |ctx: &mut Context| {
            ctx.set("ordered", false);
            Ok(())
        },
        |ctx: &mut Context, data: &BarData<'_>| {
            let asset = data.symbol("AAPL")?;
            if ctx.tick_index() == 2 {
                ctx.order_target(data, &asset, 10)?;
            }
            ctx.record("shares", ctx.portfolio().shares(asset.id()) as f64);
            Ok(())
        },
        &params,
    )
    .unwrap();

    assert_eq!(series.len(), 5);
    let shares = series.column("shares").unwrap();
    assert_eq!(
        shares,
        vec![Some(0.0), Some(0.0), Some(10.0), Some(10.0), Some(10.0)]
    );
    let cash = series.column("cash").unwrap();
    assert_eq!(cash[1], Some(1_000.0));
    assert_eq!(cash[2], Some(900.0));
    assert_eq!(cash[4], Some(900.0));
    for row in series.rows() {
        assert_eq!(row.portfolio_value, 1_000.0);
    }
    assert_eq!(series.transactions().len(), 1);
    assert_eq!(series.transactions()[0].tick_index, 2);
}

#[test]
fn history_longer_than_available_fails_the_run() {
    let store = daily_store("AAPL", d(2013, 1, 1), &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
    let params = all_days(d(2013, 1, 1), d(2013, 1, 6), 1_000.0);

    let err = run(
        &store,
        |_: &mut Context| Ok(()),
        |ctx: &mut Context, data: &BarData<'_>| {
            if ctx.tick_index() == 5 {
                let asset = data.symbol("AAPL")?;
                data.history(&asset, BarField::Price, 300)?;
            }
            Ok(())
        },
        &params,
    )
    .unwrap_err();

    match &err {
        SimError::UserCallback {
            phase, tick_index, ..
        } => {
            assert_eq!(*phase, Phase::HandleData);
            assert_eq!(*tick_index, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.engine_error(),
        Some(&EngineError::InsufficientHistory {
            symbol: "AAPL".into(),
            requested: 300,
            available: 6,
            as_of: TradingCalendar::all_days().session_close(d(2013, 1, 6)),
        })
    );
}

#[test]
fn unknown_symbol_in_initialize_aborts() {
    let store = daily_store("AAPL", d(2013, 1, 1), &[10.0; 3]);
    let params = all_days(d(2013, 1, 1), d(2013, 1, 3), 1_000.0);

    let err = run(
        &store,
        |ctx: &mut Context| {
            ctx.set("asset", "MSFT");
            Err(EngineError::UnknownSymbol("MSFT".into()).into())
        },
        |_: &mut Context, _: &BarData<'_>| Ok(()),
        &params,
    )
    .unwrap_err();
    assert_eq!(
        err.engine_error(),
        Some(&EngineError::UnknownSymbol("MSFT".into()))
    );
    assert_eq!(err.timestamp(), None);
}

// ── Properties on concrete runs ──────────────────────────────────────

#[test]
fn tick_zero_value_is_initial_cash_without_orders() {
    let store = daily_store("SPY", d(2024, 1, 1), &[100.0, 101.0, 99.0]);
    let params = all_days(d(2024, 1, 1), d(2024, 1, 3), 50_000.0);
    let series = run(&store, |_| Ok(()), |_, _| Ok(()), &params).unwrap();
    assert_eq!(series.get(0).unwrap().portfolio_value, 50_000.0);
    assert_eq!(series.final_value(), 50_000.0);
}

#[test]
fn repeated_target_on_next_tick_does_not_fill() {
    let store = daily_store("SPY", d(2024, 1, 1), &[100.0, 105.0, 110.0]);
    let params = all_days(d(2024, 1, 1), d(2024, 1, 3), 10_000.0);

    let series = run(
        &store,
        |_: &mut Context| Ok(()),
        |ctx: &mut Context, data: &BarData<'_>| {
            let asset = data.symbol("SPY")?;
            let fill = ctx.order_target(data, &asset, 20)?;
            ctx.record("filled", if fill.is_some() { 1.0 } else { 0.0 });
            Ok(())
        },
        &params,
    )
    .unwrap();

    assert_eq!(
        series.column("filled").unwrap(),
        vec![Some(1.0), Some(0.0), Some(0.0)]
    );
    assert_eq!(series.transactions().len(), 1);
    // 10_000 - 20 * 100 + 20 * 110
    assert_eq!(series.final_value(), 10_200.0);
}

#[test]
fn full_target_percent_leaves_less_than_one_share_of_cash() {
    let store = daily_store("SPY", d(2024, 1, 1), &[37.0, 37.0]);
    let params = all_days(d(2024, 1, 1), d(2024, 1, 2), 1_000.0);

    let series = run(
        &store,
        |_: &mut Context| Ok(()),
        |ctx: &mut Context, data: &BarData<'_>| {
            let asset = data.symbol("SPY")?;
            ctx.order_target_percent(data, &asset, 1.0)?;
            ctx.record("shares", ctx.portfolio().shares(asset.id()) as f64);
            Ok(())
        },
        &params,
    )
    .unwrap();

    let row = series.get(0).unwrap();
    assert_eq!(row.recorded["shares"], 27.0);
    assert!(row.cash >= 0.0 && row.cash < 37.0);
    assert_eq!(series.transactions().len(), 1);
}

#[test]
fn buying_beyond_cash_is_rejected_without_margin() {
    let store = daily_store("SPY", d(2024, 1, 1), &[100.0]);
    let params = all_days(d(2024, 1, 1), d(2024, 1, 1), 500.0);

    let err = run(
        &store,
        |_: &mut Context| Ok(()),
        |ctx: &mut Context, data: &BarData<'_>| {
            let asset = data.symbol("SPY")?;
            ctx.order_target(data, &asset, 10)?;
            Ok(())
        },
        &params,
    )
    .unwrap_err();
    assert!(matches!(
        err.engine_error(),
        Some(EngineError::InsufficientCash { .. })
    ));

    let margin = params.clone().with_margin(true);
    let series = run(
        &store,
        |_: &mut Context| Ok(()),
        |ctx: &mut Context, data: &BarData<'_>| {
            let asset = data.symbol("SPY")?;
            ctx.order_target(data, &asset, 10)?;
            Ok(())
        },
        &margin,
    )
    .unwrap();
    assert_eq!(series.get(0).unwrap().cash, -500.0);
}

#[test]
fn recorded_columns_are_unioned_with_gaps() {
    let store = daily_store("SPY", d(2024, 1, 1), &[1.0; 4]);
    let params = all_days(d(2024, 1, 1), d(2024, 1, 4), 100.0);

    let series = run(
        &store,
        |_: &mut Context| Ok(()),
        |ctx: &mut Context, _: &BarData<'_>| {
            let i = ctx.increment("ticks");
            if i % 2 == 0 {
                ctx.record("even", i as f64);
            }
            ctx.record("i", i as f64);
            ctx.record("i", i as f64 * 10.0);
            Ok(())
        },
        &params,
    )
    .unwrap();

    assert_eq!(series.columns(), ["date", "portfolio_value", "cash", "i", "even"]);
    assert_eq!(
        series.column("i").unwrap(),
        vec![Some(10.0), Some(20.0), Some(30.0), Some(40.0)]
    );
    assert_eq!(
        series.column("even").unwrap(),
        vec![None, Some(2.0), None, Some(4.0)]
    );
}

#[test]
fn rows_follow_the_clock() {
    let start = d(2024, 1, 1);
    let store = daily_store("SPY", start, &[10.0; 14]);
    // Weekday calendar: 2024-01-01 .. 2024-01-14 has ten sessions.
    let params = RunParams::new(start, d(2024, 1, 14), 100.0);
    let clock = params.clock().unwrap();

    let series = run(&store, |_| Ok(()), |_, _| Ok(()), &params).unwrap();
    assert_eq!(series.len(), clock.len());
    assert_eq!(series.len(), 10);
    let stamps: Vec<NaiveDateTime> = clock.ticks().map(|t| t.timestamp).collect();
    assert_eq!(series.timestamps(), stamps);
}

#[test]
fn minute_run_prices_from_minute_bars() {
    let calendar = TradingCalendar::weekdays();
    let day = d(2024, 1, 2);
    let mut store = HistoryStore::new();
    let asset = store.register("SPY");
    let open = calendar.session_open(day);
    for m in 1..=390 {
        let ts = open + chrono::Duration::minutes(m);
        store
            .append(asset.id(), Frequency::Minute, Bar::flat(ts, 100.0 + m as f64 * 0.01, 10.0))
            .unwrap();
    }
    let params = RunParams::new(day, day, 10_000.0).with_frequency(Frequency::Minute);

    let series = run(
        &store,
        |_: &mut Context| Ok(()),
        |ctx: &mut Context, data: &BarData<'_>| {
            let asset = data.symbol("SPY")?;
            if ctx.tick_index() == 0 {
                ctx.order_target(data, &asset, 10)?;
            }
            ctx.record("price", data.current(&asset, BarField::Price)?);
            Ok(())
        },
        &params,
    )
    .unwrap();

    assert_eq!(series.len(), 390);
    assert!((series.transactions()[0].price - 100.01).abs() < 1e-9);
    let last = series.rows().last().unwrap();
    assert!((last.recorded["price"] - 103.9).abs() < 1e-9);
}
