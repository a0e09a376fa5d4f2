//! Forecast runs from `P5MIN` and `PREDISPATCH`.
//!
//! Each run is a snapshot of forecast prices published at a run time. Run
//! and interval timestamps are shifted back by one resolution period so that
//! every entry is labelled by the start of the period it covers.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::aemo::{parse_number, AemoTable};
use super::prices::{fcas_columns, parse_fcas, INTERVENTION, REGIONID, RRP};
use super::{is_intervention, DataError, LoadStats};
use crate::domain::{parse_market_timestamp, Region};

pub use super::prices::MarketPrice;

/// AEMO forecast products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForecastProduct {
    /// 5-minute resolution, ~1 hour ahead, re-run every dispatch interval
    P5Min,
    /// 30-minute resolution, to the end of the next trading day, re-run half-hourly
    Predispatch,
}

impl ForecastProduct {
    pub fn resolution(&self) -> Duration {
        match self {
            Self::P5Min => Duration::minutes(5),
            Self::Predispatch => Duration::minutes(30),
        }
    }

    /// Name of the source table, also the directory holding its CSV files
    pub fn table(&self) -> &'static str {
        match self {
            Self::P5Min => "P5MIN_REGIONSOLUTION",
            Self::Predispatch => "PREDISPATCH_PRICE",
        }
    }

    /// How far before a window runs are still worth loading
    pub fn lookback(&self) -> Duration {
        match self {
            Self::P5Min => Duration::hours(1),
            Self::Predispatch => Duration::days(1),
        }
    }

    fn run_columns(&self) -> &'static [&'static str] {
        match self {
            Self::P5Min => &["RUN_DATETIME", "RUN_TIME"],
            Self::Predispatch => &["RUN_DATETIME", "PREDISPATCH_RUN_DATETIME", "RUN_TIME"],
        }
    }

    fn interval_columns(&self) -> &'static [&'static str] {
        match self {
            Self::P5Min => &["INTERVAL_DATETIME", "FORECASTED_TIME"],
            Self::Predispatch => &["DATETIME", "FORECASTED_TIME", "PERIOD_DATETIME"],
        }
    }
}

impl std::fmt::Display for ForecastProduct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P5Min => write!(f, "P5MIN"),
            Self::Predispatch => write!(f, "PREDISPATCH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRecord {
    /// Run time, shifted to period start
    pub run: NaiveDateTime,
    /// Start of the forecast period
    pub interval: NaiveDateTime,
    pub price: MarketPrice,
}

/// Parse forecast rows of `product` for `region`, dropping intervention runs.
pub fn parse_forecast_records(
    table: &AemoTable,
    product: ForecastProduct,
    region: Region,
) -> Result<Vec<ForecastRecord>, DataError> {
    let mut columns: Vec<&[&str]> = vec![
        product.run_columns(),
        product.interval_columns(),
        REGIONID,
        RRP,
        INTERVENTION,
    ];
    columns.extend(fcas_columns());

    let rows = table.select(product.table(), &columns, 4)?;
    let shift = product.resolution();
    let mut stats = LoadStats::default();
    let mut out = Vec::new();

    for row in rows {
        if row[2] != Some(region.as_str()) {
            continue;
        }
        stats.rows += 1;
        if is_intervention(row[4]) {
            stats.interventions += 1;
            continue;
        }
        let (Some(run), Some(interval), Some(rrp)) = (
            row[0].and_then(parse_market_timestamp),
            row[1].and_then(parse_market_timestamp),
            row[3].and_then(parse_number),
        ) else {
            stats.malformed += 1;
            continue;
        };
        stats.kept += 1;
        out.push(ForecastRecord {
            run: run - shift,
            interval: interval - shift,
            price: MarketPrice {
                rrp,
                fcas: parse_fcas(&row[5..]),
            },
        });
    }

    stats.report(product.table());
    Ok(out)
}

type Run = BTreeMap<NaiveDateTime, MarketPrice>;

/// All runs of one forecast product for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRuns {
    pub product: ForecastProduct,
    runs: BTreeMap<NaiveDateTime, Run>,
}

impl ForecastRuns {
    pub fn new(product: ForecastProduct) -> Self {
        Self {
            product,
            runs: BTreeMap::new(),
        }
    }

    pub fn from_records(product: ForecastProduct, records: impl IntoIterator<Item = ForecastRecord>) -> Self {
        let mut out = Self::new(product);
        for r in records {
            out.insert(r.run, r.interval, r.price);
        }
        out
    }

    pub fn insert(&mut self, run: NaiveDateTime, interval: NaiveDateTime, price: MarketPrice) {
        self.runs.entry(run).or_default().insert(interval, price);
    }

    /// Keep only runs published in `[from, until)`
    pub fn retain_runs(&mut self, from: NaiveDateTime, until: NaiveDateTime) {
        self.runs.retain(|run, _| *run >= from && *run < until);
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Whether every forecast value carries FCAS prices
    pub fn has_fcas(&self) -> bool {
        !self.runs.is_empty()
            && self
                .runs
                .values()
                .flat_map(|r| r.values())
                .all(|p| p.fcas.is_some())
    }

    /// Most recent run published at or before `ts`, if no older than `max_age`
    pub fn latest_run(&self, ts: NaiveDateTime, max_age: Duration) -> Option<(NaiveDateTime, &Run)> {
        self.runs
            .range(..=ts)
            .next_back()
            .filter(|(run, _)| ts - **run <= max_age)
            .map(|(run, values)| (*run, values))
    }

    /// Forecast from `run` for the period containing `time`
    pub fn value_in(&self, run: &Run, time: NaiveDateTime) -> Option<MarketPrice> {
        let resolution = self.product.resolution();
        run.range(..=time)
            .next_back()
            .filter(|(start, _)| time < **start + resolution)
            .map(|(_, p)| *p)
    }

    /// Forecasts for the `steps` dispatch intervals starting at `ts`, using the
    /// latest usable run. Step `k` covers `ts + 5k min`. `None` marks steps
    /// the run does not cover.
    pub fn window(&self, ts: NaiveDateTime, steps: usize, max_age: Duration) -> Vec<Option<MarketPrice>> {
        let Some((_, run)) = self.latest_run(ts, max_age) else {
            return vec![None; steps];
        };
        let interval = crate::domain::dispatch_interval();
        (0..steps)
            .map(|k| self.value_in(run, ts + interval * k as i32))
            .collect()
    }
}
