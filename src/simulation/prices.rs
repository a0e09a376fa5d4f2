//! # Synthetic NEM Market
//!
//! Deterministic price and forecast generator used when no AEMO data is on
//! disk. Realised prices follow a diurnal curve (morning shoulder, solar
//! trough, evening peak) with Gaussian noise and rare price spikes.
//! Forecasts are the underlying price plus noise that grows with lead time;
//! spikes only show up in forecasts within an hour of the interval.
//!
//! Every value is derived from `(seed, region, timestamp)`, so any window of
//! the market is reproducible regardless of which window was asked for first.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use validator::Validate;

use crate::data::{ForecastProduct, ForecastRuns, MarketDataSource, MarketPrice, PriceSeries};
use crate::forecast::config_digest;
use crate::domain::{
    timeline, FcasMarket, FcasValues, Region, DISPATCH_INTERVAL_MINUTES, FCAS_MARKETS,
};

/// Synthetic market configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SyntheticMarketConfig {
    /// Random seed; the same seed always yields the same market
    pub seed: u64,
    /// Average energy price ($/MWh)
    pub base_price: f64,
    /// Height of the evening peak above the base price ($/MWh)
    #[validate(range(min = 0.0))]
    pub daily_amplitude: f64,
    /// Standard deviation of interval-to-interval noise ($/MWh)
    #[validate(range(min = 0.0))]
    pub noise_std_dev: f64,
    /// Probability of a price spike in any interval
    #[validate(range(min = 0.0, max = 1.0))]
    pub spike_probability: f64,
    /// Largest spike price ($/MWh)
    #[validate(range(min = 0.0))]
    pub spike_price: f64,
    /// Forecast error standard deviation at zero lead ($/MWh)
    #[validate(range(min = 0.0))]
    pub forecast_error: f64,
    /// Extra forecast error per hour of lead time ($/MWh)
    #[validate(range(min = 0.0))]
    pub forecast_error_per_hour: f64,
    /// Number of 30-minute periods in each PREDISPATCH run
    #[validate(range(min = 1))]
    pub predispatch_periods: usize,
    /// Publish FCAS prices alongside energy prices
    pub fcas: bool,
}

impl Default for SyntheticMarketConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            base_price: 80.0,
            daily_amplitude: 90.0,
            noise_std_dev: 12.0,
            spike_probability: 0.002,
            spike_price: 3000.0,
            forecast_error: 5.0,
            forecast_error_per_hour: 4.0,
            predispatch_periods: 56,
            fcas: true,
        }
    }
}

/// Typical contingency FCAS prices ($/MW/h), in [`FcasMarket`] order
const FCAS_BASE: FcasValues = [1.5, 2.0, 3.0, 1.0, 1.5, 2.5];

const STREAM_NOISE: u64 = 1;
const STREAM_SPIKE: u64 = 2;
const STREAM_FCAS: u64 = 3;
const STREAM_FORECAST: u64 = 4;

/// Deterministic synthetic market
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    config: SyntheticMarketConfig,
}

impl SyntheticMarket {
    pub fn new(config: SyntheticMarketConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyntheticMarketConfig {
        &self.config
    }

    fn rng(&self, region: Region, ts: NaiveDateTime, stream: u64, salt: i64) -> StdRng {
        let mut h = splitmix(self.config.seed ^ stream.rotate_left(48));
        h = splitmix(h ^ region as u64);
        h = splitmix(h ^ ts.and_utc().timestamp() as u64);
        h = splitmix(h ^ salt as u64);
        StdRng::seed_from_u64(h)
    }

    /// Relative price level over the day, roughly in `[-1, 1]`
    fn diurnal(ts: NaiveDateTime) -> f64 {
        let h = ts.hour() as f64 + ts.minute() as f64 / 60.0;
        let bump = |centre: f64, width: f64| (-((h - centre) / width).powi(2)).exp();
        bump(18.5, 2.0) + 0.35 * bump(7.5, 1.5) - 0.8 * bump(13.0, 2.5)
    }

    /// Price without spikes
    fn underlying(&self, region: Region, ts: NaiveDateTime) -> f64 {
        let c = &self.config;
        let noise: f64 = self.rng(region, ts, STREAM_NOISE, 0).sample(StandardNormal);
        c.base_price + c.daily_amplitude * Self::diurnal(ts) + c.noise_std_dev * noise
    }

    fn spike(&self, region: Region, ts: NaiveDateTime) -> f64 {
        let c = &self.config;
        let mut rng = self.rng(region, ts, STREAM_SPIKE, 0);
        if c.spike_probability > 0.0 && rng.gen_bool(c.spike_probability) {
            rng.gen_range(0.1..=1.0) * c.spike_price
        } else {
            0.0
        }
    }

    fn fcas(&self, region: Region, ts: NaiveDateTime) -> Option<FcasValues> {
        if !self.config.fcas {
            return None;
        }
        let mut rng = self.rng(region, ts, STREAM_FCAS, 0);
        let level = 1.0 + 0.5 * Self::diurnal(ts);
        let mut out = [0.0; FCAS_MARKETS];
        for m in FcasMarket::iter() {
            let noise: f64 = rng.sample(StandardNormal);
            out[m.index()] = (FCAS_BASE[m.index()] * level * (1.0 + 0.3 * noise)).max(0.0);
        }
        Some(out)
    }

    /// Realised price of the interval starting at `ts`
    pub fn realised(&self, region: Region, ts: NaiveDateTime) -> MarketPrice {
        MarketPrice {
            rrp: self.underlying(region, ts) + self.spike(region, ts),
            fcas: self.fcas(region, ts),
        }
    }

    /// Forecast published at `run` for the interval starting at `ts`
    fn forecast(&self, region: Region, run: NaiveDateTime, ts: NaiveDateTime) -> MarketPrice {
        let c = &self.config;
        let lead_hours = (ts - run).num_minutes().max(0) as f64 / 60.0;
        let actual = self.realised(region, ts);
        let rrp = if lead_hours <= 1.0 {
            actual.rrp
        } else {
            self.underlying(region, ts)
        };
        let noise: f64 = self
            .rng(region, ts, STREAM_FORECAST, run.and_utc().timestamp())
            .sample(StandardNormal);
        MarketPrice {
            rrp: rrp + (c.forecast_error + c.forecast_error_per_hour * lead_hours) * noise,
            fcas: actual.fcas,
        }
    }

    fn period_forecast(&self, region: Region, run: NaiveDateTime, period: NaiveDateTime, len: i64) -> MarketPrice {
        let values: Vec<MarketPrice> = (0..len / DISPATCH_INTERVAL_MINUTES)
            .map(|k| self.forecast(region, run, period + Duration::minutes(k * DISPATCH_INTERVAL_MINUTES)))
            .collect();
        let n = values.len().max(1) as f64;
        let rrp = values.iter().map(|v| v.rrp).sum::<f64>() / n;
        let fcas = values.first().and_then(|v| v.fcas).map(|first| {
            let mut mean = [0.0; FCAS_MARKETS];
            for v in &values {
                for (acc, x) in mean.iter_mut().zip(v.fcas.unwrap_or(first)) {
                    *acc += x / n;
                }
            }
            mean
        });
        MarketPrice { rrp, fcas }
    }

    /// All runs of `product` published in `[from, until)`
    pub fn runs(&self, product: ForecastProduct, region: Region, from: NaiveDateTime, until: NaiveDateTime) -> ForecastRuns {
        let resolution = product.resolution();
        let mut out = ForecastRuns::new(product);
        let first = align_down(from, resolution);

        let mut run = first;
        while run < until {
            if run >= from {
                match product {
                    ForecastProduct::P5Min => {
                        for k in 0..12 {
                            let ts = run + resolution * k;
                            out.insert(run, ts, self.forecast(region, run, ts));
                        }
                    }
                    ForecastProduct::Predispatch => {
                        for k in 0..self.config.predispatch_periods as i32 {
                            let period = run + resolution * k;
                            out.insert(
                                run,
                                period,
                                self.period_forecast(region, run, period, resolution.num_minutes()),
                            );
                        }
                    }
                }
            }
            run += resolution;
        }
        out
    }
}

#[async_trait]
impl MarketDataSource for SyntheticMarket {
    async fn realised_prices(
        &self,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<PriceSeries> {
        let timestamps = timeline(start, end);
        let prices: Vec<MarketPrice> = timestamps.iter().map(|ts| self.realised(region, *ts)).collect();
        let energy = prices.iter().map(|p| p.rrp).collect();
        let fcas = prices.iter().map(|p| p.fcas).collect::<Option<Vec<_>>>();
        Ok(PriceSeries {
            timestamps,
            energy,
            fcas,
        })
    }

    async fn forecast_runs(
        &self,
        product: ForecastProduct,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<ForecastRuns> {
        let market = self.clone();
        let runs = tokio::task::spawn_blocking(move || {
            market.runs(product, region, start - product.lookback(), end)
        })
        .await?;
        tracing::debug!(%product, %region, runs = runs.run_count(), "generated synthetic forecast runs");
        Ok(runs)
    }

    fn cache_namespace(&self) -> String {
        format!("synthetic-{}-{}", self.config.seed, config_digest(&self.config))
    }
}

fn align_down(ts: NaiveDateTime, step: Duration) -> NaiveDateTime {
    let secs = ts.and_utc().timestamp();
    let step = step.num_seconds().max(1);
    ts - Duration::seconds(secs.rem_euclid(step))
}

fn splitmix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
