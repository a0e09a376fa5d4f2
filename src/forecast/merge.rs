//! Merged P5MIN/PREDISPATCH forecasts at dispatch resolution.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::data::{ForecastRuns, MarketPrice, PriceSeries};
use crate::domain::{FcasValues, Region, FCAS_MARKETS, INTERVALS_PER_DAY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ForecastSettings {
    /// Steps per forecast row (288 = one day of dispatch intervals)
    #[validate(range(min = 1, max = 2016))]
    pub steps: usize,
    /// Leading steps taken from P5MIN before switching to PREDISPATCH
    #[validate(range(max = 12))]
    pub p5min_steps: usize,
    /// Oldest P5MIN run still used for a row
    #[validate(range(min = 0))]
    pub p5min_max_age_minutes: i64,
    /// Oldest PREDISPATCH run still used for a row
    #[validate(range(min = 0))]
    pub predispatch_max_age_minutes: i64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            steps: INTERVALS_PER_DAY,
            p5min_steps: 12,
            p5min_max_age_minutes: 15,
            predispatch_max_age_minutes: 60,
        }
    }
}

impl ForecastSettings {
    pub fn p5min_max_age(&self) -> Duration {
        Duration::minutes(self.p5min_max_age_minutes)
    }

    pub fn predispatch_max_age(&self) -> Duration {
        Duration::minutes(self.predispatch_max_age_minutes)
    }
}

/// Forecast prices for the intervals starting at one timestamp.
///
/// Step 0 is the interval being dispatched. Rows may be shorter than the
/// configured number of steps when the forecast does not reach that far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub energy: Vec<f64>,
    pub fcas: Option<Vec<FcasValues>>,
}

impl ForecastRow {
    pub fn len(&self) -> usize {
        self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTable {
    pub region: Region,
    pub timestamps: Vec<NaiveDateTime>,
    pub rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_fcas(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.fcas.is_some())
    }

    pub fn max_steps(&self) -> usize {
        self.rows.iter().map(ForecastRow::len).max().unwrap_or(0)
    }
}

fn push_value(row: &mut ForecastRow, value: MarketPrice) {
    row.energy.push(value.rrp);
    if let Some(fcas) = row.fcas.as_mut() {
        fcas.push(value.fcas.unwrap_or([f64::NAN; FCAS_MARKETS]));
    }
}

/// Merge P5MIN and PREDISPATCH runs into one-day forecast rows.
///
/// For each timestamp the latest run of each product is used. The first
/// `p5min_steps` steps prefer P5MIN, everything after comes from
/// PREDISPATCH. A row stops at the first step neither source covers.
pub fn merge_one_day_forecast(
    region: Region,
    timestamps: &[NaiveDateTime],
    p5min: &ForecastRuns,
    predispatch: &ForecastRuns,
    settings: &ForecastSettings,
) -> ForecastTable {
    let steps = settings.steps;
    let p5min_steps = settings.p5min_steps.min(steps);
    let with_fcas = p5min.has_fcas() && predispatch.has_fcas();

    let mut rows = Vec::with_capacity(timestamps.len());
    let mut empty = 0usize;
    let mut short = 0usize;

    for &ts in timestamps {
        let near = p5min.window(ts, p5min_steps, settings.p5min_max_age());
        let far = predispatch.window(ts, steps, settings.predispatch_max_age());

        let mut row = ForecastRow {
            energy: Vec::with_capacity(steps),
            fcas: with_fcas.then(|| Vec::with_capacity(steps)),
        };
        for (k, pd) in far.into_iter().enumerate() {
            let value = near.get(k).copied().flatten().or(pd);
            match value {
                Some(v) => push_value(&mut row, v),
                None => break,
            }
        }

        if row.is_empty() {
            empty += 1;
        } else if row.len() < steps {
            short += 1;
        }
        rows.push(row);
    }

    if empty > 0 {
        tracing::warn!(%region, empty, "no usable forecast run for some intervals");
    }
    tracing::info!(
        %region,
        rows = rows.len(),
        short,
        fcas = with_fcas,
        "merged P5MIN and PREDISPATCH forecasts"
    );

    ForecastTable {
        region,
        timestamps: timestamps.to_vec(),
        rows,
    }
}

/// Forecast rows built from realised prices, i.e. perfect foresight.
///
/// Row `i` holds prices from interval `i` onwards, cut at the end of the
/// data or the first missing price.
pub fn perfect_forecast(region: Region, prices: &PriceSeries, steps: usize) -> ForecastTable {
    let n = prices.len();
    let rows = (0..n)
        .map(|i| {
            let end = (i + steps).min(n);
            let valid = prices.energy[i..end]
                .iter()
                .take_while(|p| !p.is_nan())
                .count();
            ForecastRow {
                energy: prices.energy[i..i + valid].to_vec(),
                fcas: prices.fcas.as_ref().map(|f| f[i..i + valid].to_vec()),
            }
        })
        .collect();

    ForecastTable {
        region,
        timestamps: prices.timestamps.clone(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ForecastProduct;
    use crate::domain::{parse_market_timestamp, timeline};

    fn ts(s: &str) -> NaiveDateTime {
        parse_market_timestamp(s).unwrap()
    }

    fn price(rrp: f64) -> MarketPrice {
        MarketPrice { rrp, fcas: None }
    }

    fn fixtures() -> (ForecastRuns, ForecastRuns) {
        let mut p5 = ForecastRuns::new(ForecastProduct::P5Min);
        let run = ts("2023-01-01 00:00");
        for k in 0..12 {
            p5.insert(run, run + Duration::minutes(5 * k), price(100.0 + k as f64));
        }

        let mut pd = ForecastRuns::new(ForecastProduct::Predispatch);
        for k in 0..4 {
            pd.insert(run, run + Duration::minutes(30 * k), price(10.0 * (k + 1) as f64));
        }
        (p5, pd)
    }

    #[test]
    fn test_p5min_then_predispatch() {
        let (p5, pd) = fixtures();
        let settings = ForecastSettings {
            steps: 30,
            ..Default::default()
        };
        let table = merge_one_day_forecast(Region::SA1, &[ts("2023-01-01 00:00")], &p5, &pd, &settings);
        let row = &table.rows[0];
        // Predispatch covers 00:00-02:00 = 24 intervals
        assert_eq!(row.len(), 24);
        assert_eq!(row.energy[0], 100.0);
        assert_eq!(row.energy[11], 111.0);
        // 01:00 falls in the third predispatch period
        assert_eq!(row.energy[12], 30.0);
        assert_eq!(row.energy[23], 40.0);
        assert!(row.fcas.is_none());
    }

    #[test]
    fn test_step_zero_is_dispatched_interval() {
        let (p5, pd) = fixtures();
        let settings = ForecastSettings {
            steps: 12,
            ..Default::default()
        };
        // The 00:00 P5MIN run is still fresh at 00:10
        let table = merge_one_day_forecast(Region::SA1, &[ts("2023-01-01 00:10")], &p5, &pd, &settings);
        let row = &table.rows[0];
        assert_eq!(row.energy[0], 102.0);
        assert_eq!(row.energy[9], 111.0);
        // P5MIN run ends, predispatch fills in
        assert_eq!(row.energy[10], 30.0);
    }

    #[test]
    fn test_stale_runs_give_empty_rows() {
        let (p5, pd) = fixtures();
        let table = merge_one_day_forecast(
            Region::SA1,
            &[ts("2023-01-01 03:00")],
            &p5,
            &pd,
            &ForecastSettings::default(),
        );
        assert!(table.rows[0].is_empty());
    }

    #[test]
    fn test_perfect_forecast_truncates_at_gap() {
        let timestamps = timeline(ts("2023-01-01 00:00"), ts("2023-01-01 00:30"));
        let prices = PriceSeries {
            timestamps,
            energy: vec![1.0, 2.0, 3.0, f64::NAN, 5.0, 6.0],
            fcas: None,
        };
        let table = perfect_forecast(Region::QLD1, &prices, 4);
        assert_eq!(table.rows[0].energy, vec![1.0, 2.0, 3.0]);
        assert_eq!(table.rows[3].energy, Vec::<f64>::new());
        assert_eq!(table.rows[4].energy, vec![5.0, 6.0]);
        assert_eq!(table.max_steps(), 3);
    }

    #[test]
    fn test_settings_validation() {
        assert!(ForecastSettings::default().validate().is_ok());
        let bad = ForecastSettings {
            steps: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
