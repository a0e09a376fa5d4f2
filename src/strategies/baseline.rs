use serde::{Deserialize, Serialize};

use super::{Observation, Strategy, StrategyError};
use crate::domain::Action;

/// Price thresholds shared by the two baseline strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineParams {
    /// Charge below this price ($/MWh)
    pub charge_limit: f64,
    /// Discharge above this price ($/MWh)
    pub discharge_limit: f64,
    /// Stop acting for the rest of the day after this many actions
    pub max_daily_actions: u32,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            charge_limit: 40.0,
            discharge_limit: 150.0,
            max_daily_actions: 48,
        }
    }
}

impl BaselineParams {
    pub(crate) fn validate(&self, strategy: &'static str) -> Result<(), StrategyError> {
        if !self.charge_limit.is_finite() || !self.discharge_limit.is_finite() {
            return Err(StrategyError::InvalidParameter {
                strategy,
                parameter: "charge_limit/discharge_limit",
                reason: "limits must be finite".into(),
            });
        }
        if self.charge_limit > self.discharge_limit {
            return Err(StrategyError::InvalidParameter {
                strategy,
                parameter: "charge_limit",
                reason: format!(
                    "charge limit {} exceeds discharge limit {}",
                    self.charge_limit, self.discharge_limit
                ),
            });
        }
        Ok(())
    }

    /// Below half charge, charge on a low price; otherwise discharge on a high one.
    fn decide(&self, price: f64, obs: &Observation<'_>) -> Action {
        if obs.actions_today >= self.max_daily_actions {
            return Action::idle();
        }
        if obs.c_soc < obs.c_max / 2.0 {
            if price < self.charge_limit && obs.c_soc < obs.c_max {
                return Action::charge(1.0);
            }
        } else if price > self.discharge_limit && obs.c_soc > 0.0 {
            return Action::discharge(1.0);
        }
        Action::idle()
    }
}

/// Threshold strategy on the previous interval's realised price.
#[derive(Debug, Clone)]
pub struct NaiveBaseline {
    params: BaselineParams,
}

impl NaiveBaseline {
    pub fn new(params: BaselineParams) -> Result<Self, StrategyError> {
        params.validate("NaiveBaseline")?;
        Ok(Self { params })
    }
}

impl Strategy for NaiveBaseline {
    fn name(&self) -> &str {
        "NaiveBaseline"
    }

    fn action(&self, obs: &Observation<'_>) -> Result<Action, StrategyError> {
        Ok(self.params.decide(obs.last_price, obs))
    }
}

/// Same thresholds as [`NaiveBaseline`], applied to the forecast for the
/// interval being dispatched.
#[derive(Debug, Clone)]
pub struct ForecastBaseline {
    params: BaselineParams,
}

impl ForecastBaseline {
    pub fn new(params: BaselineParams) -> Result<Self, StrategyError> {
        params.validate("ForecastBaseline")?;
        Ok(Self { params })
    }
}

impl Strategy for ForecastBaseline {
    fn name(&self) -> &str {
        "ForecastBaseline"
    }

    fn action(&self, obs: &Observation<'_>) -> Result<Action, StrategyError> {
        let Some(&next) = obs.forecast.first() else {
            return Ok(Action::idle());
        };
        Ok(self.params.decide(next, obs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testing::observation;

    #[test]
    fn test_naive_charges_when_low_and_cheap() {
        let s = NaiveBaseline::new(BaselineParams::default()).unwrap();
        let mut obs = observation(&[]);
        obs.c_soc = 10.0;
        obs.last_price = 20.0;
        assert_eq!(s.action(&obs).unwrap(), Action::charge(1.0));

        obs.last_price = 60.0;
        assert!(s.action(&obs).unwrap().is_idle());
    }

    #[test]
    fn test_naive_discharges_when_high_and_expensive() {
        let s = NaiveBaseline::new(BaselineParams::default()).unwrap();
        let mut obs = observation(&[]);
        obs.c_soc = 40.0;
        obs.last_price = 300.0;
        assert_eq!(s.action(&obs).unwrap(), Action::discharge(1.0));

        // Above half charge, cheap prices do not trigger charging
        obs.last_price = 0.0;
        assert!(s.action(&obs).unwrap().is_idle());
    }

    #[test]
    fn test_first_interval_without_last_price_is_idle() {
        let s = NaiveBaseline::new(BaselineParams::default()).unwrap();
        let mut obs = observation(&[]);
        obs.c_soc = 0.0;
        assert!(s.action(&obs).unwrap().is_idle());
    }

    #[test]
    fn test_daily_action_limit() {
        let s = NaiveBaseline::new(BaselineParams {
            max_daily_actions: 3,
            ..Default::default()
        })
        .unwrap();
        let mut obs = observation(&[]);
        obs.c_soc = 0.0;
        obs.last_price = -10.0;
        obs.actions_today = 2;
        assert_eq!(s.action(&obs).unwrap().energy, 1.0);
        obs.actions_today = 3;
        assert!(s.action(&obs).unwrap().is_idle());
    }

    #[test]
    fn test_forecast_baseline_uses_next_interval() {
        let s = ForecastBaseline::new(BaselineParams::default()).unwrap();
        let forecast = [10.0, 500.0];
        let mut obs = observation(&forecast);
        obs.c_soc = 5.0;
        obs.last_price = 1000.0;
        assert_eq!(s.action(&obs).unwrap().energy, 1.0);
        assert!(s.action(&observation(&[])).unwrap().is_idle());
    }

    #[test]
    fn test_inverted_limits_rejected() {
        let err = NaiveBaseline::new(BaselineParams {
            charge_limit: 200.0,
            discharge_limit: 100.0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, StrategyError::InvalidParameter { parameter: "charge_limit", .. }));
    }
}
