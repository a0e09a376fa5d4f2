//! Dispatch Strategies
//!
//! A strategy turns one [`Observation`] into an [`Action`] for the interval
//! being dispatched:
//! - Baselines: fixed price thresholds on the last price or the next forecast
//! - QuantilePicker: thresholds taken from the forecast distribution
//! - DP: discretised dynamic programme over SOC levels
//! - Optimised / OptimisedFcas: linear programmes over the forecast horizon

pub mod baseline;
pub mod config;
pub mod dp;
#[cfg(feature = "optimization")]
pub mod optimised;
#[cfg(feature = "optimization")]
pub mod optimised_fcas;
pub mod quantiles;

pub use baseline::*;
pub use config::*;
pub use dp::*;
#[cfg(feature = "optimization")]
pub use optimised::*;
#[cfg(feature = "optimization")]
pub use optimised_fcas::*;
pub use quantiles::*;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::{Action, FcasValues};

/// Everything a strategy may look at before acting.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    /// Start of the interval being dispatched
    pub timestamp: NaiveDateTime,
    /// Forecast energy prices; step 0 is the interval being dispatched
    pub forecast: &'a [f64],
    /// Forecast FCAS prices aligned with `forecast`, when available
    pub fcas_forecast: Option<&'a [FcasValues]>,
    /// Stored energy (MWh)
    pub c_soc: f64,
    /// Current capacity after degradation (MWh)
    pub c_max: f64,
    /// Power rating (MW)
    pub p_max: f64,
    pub eta_chg: f64,
    pub eta_dchg: f64,
    /// Realised price of the previous interval, `NaN` on the first
    pub last_price: f64,
    /// Actions already taken on this market day
    pub actions_today: u32,
    /// Interval length (hours)
    pub dt: f64,
}

impl Observation<'_> {
    /// First `horizon` forecast steps
    pub fn horizon(&self, horizon: usize) -> &[f64] {
        &self.forecast[..self.forecast.len().min(horizon)]
    }

    pub fn forecast_has_nan(&self) -> bool {
        self.forecast.iter().any(|p| p.is_nan())
    }
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy '{0}'")]
    Unknown(String),

    #[error("invalid strategy description '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("{strategy}: invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        strategy: &'static str,
        parameter: &'static str,
        reason: String,
    },

    #[error("{0} needs FCAS price forecasts but none were provided")]
    MissingFcasForecast(&'static str),

    #[error("{0} requires the 'optimization' feature")]
    OptimisationUnavailable(&'static str),
}

pub trait Strategy: Send + Sync {
    /// Display name used in results and scorecards
    fn name(&self) -> &str;

    fn action(&self, observation: &Observation<'_>) -> Result<Action, StrategyError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::domain::{parse_market_timestamp, DISPATCH_INTERVAL_HOURS};

    /// Observation of the default 50 MW / 50 MWh battery at half charge
    pub fn observation(forecast: &[f64]) -> Observation<'_> {
        Observation {
            timestamp: parse_market_timestamp("2023-01-01 00:00").unwrap(),
            forecast,
            fcas_forecast: None,
            c_soc: 25.0,
            c_max: 50.0,
            p_max: 50.0,
            eta_chg: 0.9,
            eta_dchg: 0.95,
            last_price: f64::NAN,
            actions_today: 0,
            dt: DISPATCH_INTERVAL_HOURS,
        }
    }
}
