//! AEMO CSV tables on disk through to a finished backtest.

use chrono::{Duration, NaiveDateTime};
use std::fmt::Write as _;
use std::path::Path;

use bessie::backtest::{run_backtest, BacktestInputData, BacktestOptions};
use bessie::data::CsvMarketData;
use bessie::domain::{parse_market_timestamp, BatterySpec, Region};
use bessie::forecast::{ForecastCache, ForecastSettings};
use bessie::strategies::StrategyConfig;

fn ts(s: &str) -> NaiveDateTime {
    parse_market_timestamp(s).unwrap()
}

fn stamp(t: NaiveDateTime) -> String {
    t.format("%Y/%m/%d %H:%M:%S").to_string()
}

/// Cheap first half hour, expensive second half hour
fn realised(interval_start: NaiveDateTime) -> f64 {
    if interval_start < ts("2023-01-01 00:30") {
        20.0
    } else {
        200.0
    }
}

fn write_table(root: &Path, table: &str, contents: &str) {
    let dir = root.join(table);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("2023-01.csv"), contents).unwrap();
}

/// Writes one hour of SA1 data; published timestamps are interval ends.
fn write_fixtures(root: &Path) {
    let start = ts("2023-01-01 00:00");
    let five = Duration::minutes(5);

    let mut dispatch = String::from("SETTLEMENTDATE,REGIONID,RRP,INTERVENTION\n");
    for k in 0..12 {
        let begin = start + five * k;
        writeln!(dispatch, "{},SA1,{},0", stamp(begin + five), realised(begin)).unwrap();
        writeln!(dispatch, "{},VIC1,1.0,0", stamp(begin + five)).unwrap();
    }
    // Intervention pricing is ignored
    writeln!(dispatch, "{},SA1,15000,1", stamp(start + five)).unwrap();
    write_table(root, "DISPATCHPRICE", &dispatch);

    // P5MIN runs every five minutes, forecasting realised + 1
    let mut p5min = String::from("RUN_DATETIME,INTERVAL_DATETIME,REGIONID,RRP,INTERVENTION\n");
    for r in 0..12 {
        let run = start + five * r;
        for k in 0..12 {
            let begin = run + five * k;
            writeln!(
                p5min,
                "{},{},SA1,{},0",
                stamp(run + five),
                stamp(begin + five),
                realised(begin) + 1.0
            )
            .unwrap();
        }
    }
    write_table(root, "P5MIN_REGIONSOLUTION", &p5min);

    // PREDISPATCH runs every half hour, four periods each, flat at 100
    let thirty = Duration::minutes(30);
    let mut predispatch = String::from("PREDISPATCH_RUN_DATETIME,DATETIME,REGIONID,RRP,INTERVENTION\n");
    for r in 0..2 {
        let run = start + thirty * r;
        for k in 0..4 {
            let period = run + thirty * k;
            writeln!(
                predispatch,
                "{},{},SA1,100,0",
                stamp(run + thirty),
                stamp(period + thirty)
            )
            .unwrap();
        }
    }
    write_table(root, "PREDISPATCH_PRICE", &predispatch);
}

fn settings() -> ForecastSettings {
    ForecastSettings {
        steps: 24,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_merged_forecast_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let source = CsvMarketData::new(dir.path());

    let data = BacktestInputData::from_aemo_forecasts(
        &source,
        Region::SA1,
        ts("2023-01-01 00:00"),
        ts("2023-01-01 01:00"),
        &settings(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(data.len(), 12);
    assert_eq!(data.prices.energy[0], 20.0);
    assert_eq!(data.prices.energy[11], 200.0);
    assert_eq!(data.prices.missing_count(), 0);

    let first = &data.forecast.rows[0];
    assert_eq!(first.len(), 24);
    // Near steps from P5MIN, the rest from PREDISPATCH
    assert_eq!(first.energy[0], 21.0);
    assert_eq!(first.energy[6], 201.0);
    assert_eq!(first.energy[11], 201.0);
    assert_eq!(first.energy[12], 100.0);
    assert!(data.forecast.rows.iter().all(|r| !r.is_empty()));
}

#[tokio::test]
async fn test_backtest_on_csv_data() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let source = CsvMarketData::new(dir.path());
    let cache = ForecastCache::new(dir.path().join("cache"));
    let settings = settings();

    let load = || {
        BacktestInputData::from_aemo_forecasts(
            &source,
            Region::SA1,
            ts("2023-01-01 00:00"),
            ts("2023-01-01 01:00"),
            &settings,
            Some(&cache),
        )
    };
    let data = load().await.unwrap();
    let cached = load().await.unwrap();
    assert_eq!(data.forecast, cached.forecast);

    let spec = BatterySpec::from_power_and_duration(10.0, 1.0);
    let strategy: StrategyConfig = "dp_optimised:n_soc=50".parse().unwrap();
    let strategy = strategy.build().unwrap();
    let results = run_backtest(&data, &spec, strategy.as_ref(), &BacktestOptions::default()).unwrap();

    assert_eq!(results.len(), 12);
    assert!(results.c_soc.iter().all(|&c| (0.0..=spec.e_max).contains(&c)));
    // Buys in the cheap half hour, sells in the expensive one
    assert!(results.p_actions[..6].iter().any(|&p| p > 0.0));
    assert!(results.p_actions[6..].iter().any(|&p| p < 0.0));
    assert!(results.total_revenue() > 0.0);
}

#[tokio::test]
async fn test_region_without_forecasts_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let source = CsvMarketData::new(dir.path());

    let result = BacktestInputData::from_aemo_forecasts(
        &source,
        Region::VIC1,
        ts("2023-01-01 00:00"),
        ts("2023-01-01 01:00"),
        &settings(),
        None,
    )
    .await;
    assert!(result.is_err());
}
