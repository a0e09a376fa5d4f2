use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::BacktestError;
use crate::data::{MarketDataSource, PriceSeries};
use crate::domain::{timeline, trading_date, Region, DISPATCH_INTERVAL_HOURS};
use crate::forecast::{one_day_forecast, perfect_forecast, ForecastCache, ForecastSettings, ForecastTable};

/// Which forecast the strategy is shown
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastMode {
    /// Merged P5MIN and PREDISPATCH forecasts
    #[default]
    Aemo,
    /// Realised prices, i.e. perfect foresight
    Perfect,
}

/// Everything a backtest replays, aligned on one dispatch timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestInputData {
    pub region: Region,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub timestamps: Vec<NaiveDateTime>,
    pub forecast: ForecastTable,
    pub prices: PriceSeries,
    /// Interval length (hours)
    pub dt: f64,
}

impl BacktestInputData {
    pub fn new(
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
        prices: PriceSeries,
        forecast: ForecastTable,
    ) -> Result<Self, BacktestError> {
        check_window(start, end)?;
        let timestamps = timeline(start, end);
        let expected = timestamps.len();

        let lengths = [
            ("realised prices", prices.energy.len()),
            ("realised price timestamps", prices.timestamps.len()),
            ("FCAS prices", prices.fcas.as_ref().map_or(expected, Vec::len)),
            ("forecast rows", forecast.rows.len()),
            ("forecast timestamps", forecast.timestamps.len()),
        ];
        for (series, actual) in lengths {
            if actual != expected {
                return Err(BacktestError::LengthMismatch {
                    series,
                    expected,
                    actual,
                });
            }
        }

        Ok(Self {
            region,
            start,
            end,
            timestamps,
            forecast,
            prices,
            dt: DISPATCH_INTERVAL_HOURS,
        })
    }

    /// Realised prices plus the merged P5MIN/PREDISPATCH forecast
    pub async fn from_aemo_forecasts(
        source: &dyn MarketDataSource,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
        settings: &ForecastSettings,
        cache: Option<&ForecastCache>,
    ) -> Result<Self> {
        check_window(start, end)?;
        let (prices, forecast) = tokio::try_join!(
            source.realised_prices(region, start, end),
            one_day_forecast(source, region, start, end, settings, cache),
        )?;
        Ok(Self::new(region, start, end, prices, forecast)?)
    }

    /// Realised prices shown to the strategy as its own forecast
    pub async fn from_perfect_forecasts(
        source: &dyn MarketDataSource,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
        settings: &ForecastSettings,
    ) -> Result<Self> {
        check_window(start, end)?;
        let prices = source.realised_prices(region, start, end).await?;
        let forecast = perfect_forecast(region, &prices, settings.steps);
        Ok(Self::new(region, start, end, prices, forecast)?)
    }

    pub async fn load(
        mode: ForecastMode,
        source: &dyn MarketDataSource,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
        settings: &ForecastSettings,
        cache: Option<&ForecastCache>,
    ) -> Result<Self> {
        let data = match mode {
            ForecastMode::Aemo => {
                Self::from_aemo_forecasts(source, region, start, end, settings, cache).await?
            }
            ForecastMode::Perfect => {
                Self::from_perfect_forecasts(source, region, start, end, settings).await?
            }
        };
        tracing::info!(
            %region,
            %mode,
            intervals = data.len(),
            missing_prices = data.prices.missing_count(),
            fcas = data.prices.fcas.is_some(),
            "backtest input loaded"
        );
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Window length in (fractional) days
    pub fn n_days(&self) -> f64 {
        self.len() as f64 * self.dt / 24.0
    }

    /// Distinct trading days touched by the window
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.timestamps.iter().copied().map(trading_date).collect();
        dates.dedup();
        dates
    }
}

fn check_window(start: NaiveDateTime, end: NaiveDateTime) -> Result<(), BacktestError> {
    if start < end {
        Ok(())
    } else {
        Err(BacktestError::InvalidWindow { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_market_timestamp;
    use crate::simulation::{SyntheticMarket, SyntheticMarketConfig};

    fn ts(s: &str) -> NaiveDateTime {
        parse_market_timestamp(s).unwrap()
    }

    fn flat_prices(start: NaiveDateTime, end: NaiveDateTime) -> PriceSeries {
        let timestamps = timeline(start, end);
        PriceSeries {
            energy: vec![50.0; timestamps.len()],
            timestamps,
            fcas: None,
        }
    }

    #[test]
    fn test_rejects_empty_window() {
        let start = ts("2023-01-01 00:00");
        let prices = flat_prices(start, start);
        let forecast = perfect_forecast(Region::SA1, &prices, 12);
        let err = BacktestInputData::new(Region::SA1, start, start, prices, forecast).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidWindow { .. }));
    }

    #[test]
    fn test_rejects_misaligned_forecast() {
        let (start, end) = (ts("2023-01-01 00:00"), ts("2023-01-01 01:00"));
        let prices = flat_prices(start, end);
        let mut forecast = perfect_forecast(Region::SA1, &prices, 12);
        forecast.rows.pop();

        let err = BacktestInputData::new(Region::SA1, start, end, prices, forecast).unwrap_err();
        assert!(matches!(
            err,
            BacktestError::LengthMismatch {
                series: "forecast rows",
                expected: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn test_window_statistics() {
        let (start, end) = (ts("2023-01-01 12:00"), ts("2023-01-02 18:00"));
        let prices = flat_prices(start, end);
        let forecast = perfect_forecast(Region::VIC1, &prices, 12);
        let data = BacktestInputData::new(Region::VIC1, start, end, prices, forecast).unwrap();
        assert_eq!(data.len(), 360);
        assert!((data.n_days() - 1.25).abs() < 1e-12);
        assert_eq!(data.dates().len(), 2);

        // 02:00 to 05:00 spans the 04:00 rollover, not midnight
        let (start, end) = (ts("2023-01-03 02:00"), ts("2023-01-03 05:00"));
        let prices = flat_prices(start, end);
        let forecast = perfect_forecast(Region::VIC1, &prices, 12);
        let data = BacktestInputData::new(Region::VIC1, start, end, prices, forecast).unwrap();
        let dates: Vec<String> = data.dates().iter().map(|d| d.to_string()).collect();
        assert_eq!(dates, vec!["2023-01-02", "2023-01-03"]);
    }

    #[tokio::test]
    async fn test_loads_both_modes_from_synthetic_market() {
        let market = SyntheticMarket::new(SyntheticMarketConfig::default());
        let (start, end) = (ts("2023-03-01 00:00"), ts("2023-03-01 06:00"));
        let settings = ForecastSettings {
            steps: 24,
            ..Default::default()
        };

        for mode in [ForecastMode::Aemo, ForecastMode::Perfect] {
            let data = BacktestInputData::load(mode, &market, Region::NSW1, start, end, &settings, None)
                .await
                .unwrap();
            assert_eq!(data.len(), 72);
            assert_eq!(data.forecast.len(), 72);
            assert!(data.forecast.rows.iter().all(|r| !r.is_empty() && r.len() <= 24));
        }
    }
}
