use serde::{Deserialize, Serialize};

use super::{Observation, Strategy, StrategyError};
use crate::domain::Action;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantileParams {
    pub charge_quantile: f64,
    pub discharge_quantile: f64,
}

impl Default for QuantileParams {
    fn default() -> Self {
        Self {
            charge_quantile: 0.10,
            discharge_quantile: 0.90,
        }
    }
}

/// Charges when the next price sits in the bottom of the forecast
/// distribution and discharges when it sits at the top.
#[derive(Debug, Clone)]
pub struct QuantilePicker {
    params: QuantileParams,
}

impl QuantilePicker {
    pub fn new(params: QuantileParams) -> Result<Self, StrategyError> {
        for (parameter, q) in [
            ("charge_quantile", params.charge_quantile),
            ("discharge_quantile", params.discharge_quantile),
        ] {
            if !(0.0..=1.0).contains(&q) {
                return Err(StrategyError::InvalidParameter {
                    strategy: "QuantilePicker",
                    parameter,
                    reason: format!("{q} is not in [0, 1]"),
                });
            }
        }
        Ok(Self { params })
    }
}

/// Quantile with linear interpolation between order statistics
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

impl Strategy for QuantilePicker {
    fn name(&self) -> &str {
        "QuantilePicker"
    }

    fn action(&self, obs: &Observation<'_>) -> Result<Action, StrategyError> {
        if obs.forecast_has_nan() {
            return Ok(Action::idle());
        }
        let (Some(&next), Some(low), Some(high)) = (
            obs.forecast.first(),
            quantile(obs.forecast, self.params.charge_quantile),
            quantile(obs.forecast, self.params.discharge_quantile),
        ) else {
            return Ok(Action::idle());
        };

        if next < low && obs.c_soc < obs.c_max {
            Ok(Action::charge(1.0))
        } else if next > high && obs.c_soc > 0.0 {
            Ok(Action::discharge(1.0))
        } else {
            Ok(Action::idle())
        }
    }
}
