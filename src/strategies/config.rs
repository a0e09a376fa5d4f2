use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::domain::INTERVALS_PER_DAY;

use super::{
    BaselineParams, DpOptimised, DpParams, ForecastBaseline, NaiveBaseline, QuantileParams,
    QuantilePicker, Strategy, StrategyError,
};

/// Serializable description of a strategy and its parameters.
///
/// On the command line a strategy is written as `kind` or
/// `kind:key=value,key=value`, e.g. `dp_optimised:gamma=5,n_soc=200`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    NaiveBaseline(BaselineParams),
    ForecastBaseline(BaselineParams),
    QuantilePicker(QuantileParams),
    DpOptimised(DpParams),
    Optimised(OptimisedParams),
    OptimisedFcas(OptimisedParams),
}

/// Parameters of the LP strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimisedParams {
    /// Penalty per MWh moved ($/MWh)
    pub gamma: f64,
    /// Forecast steps considered
    pub horizon: usize,
}

impl Default for OptimisedParams {
    fn default() -> Self {
        Self {
            gamma: 0.0,
            horizon: INTERVALS_PER_DAY,
        }
    }
}

impl OptimisedParams {
    pub(crate) fn validate(&self, strategy: &'static str) -> Result<(), StrategyError> {
        if self.horizon == 0 {
            return Err(StrategyError::InvalidParameter {
                strategy,
                parameter: "horizon",
                reason: "horizon must be positive".into(),
            });
        }
        if !(self.gamma.is_finite() && self.gamma >= 0.0) {
            return Err(StrategyError::InvalidParameter {
                strategy,
                parameter: "gamma",
                reason: format!("{} is not a non-negative number", self.gamma),
            });
        }
        Ok(())
    }
}

const KINDS: [&str; 6] = [
    "naive_baseline",
    "forecast_baseline",
    "quantile_picker",
    "dp_optimised",
    "optimised",
    "optimised_fcas",
];

impl StrategyConfig {
    /// Strategy name as reported in results
    pub fn label(&self) -> &'static str {
        match self {
            Self::NaiveBaseline(_) => "NaiveBaseline",
            Self::ForecastBaseline(_) => "ForecastBaseline",
            Self::QuantilePicker(_) => "QuantilePicker",
            Self::DpOptimised(_) => "DpOptimised",
            Self::Optimised(_) => "Optimised",
            Self::OptimisedFcas(_) => "OptimisedFcas",
        }
    }

    /// Whether the strategy cannot run without FCAS price forecasts
    pub fn needs_fcas(&self) -> bool {
        matches!(self, Self::OptimisedFcas(_))
    }

    /// Validate parameters and construct the strategy
    pub fn build(&self) -> Result<Box<dyn Strategy>, StrategyError> {
        Ok(match self {
            Self::NaiveBaseline(p) => Box::new(NaiveBaseline::new(*p)?),
            Self::ForecastBaseline(p) => Box::new(ForecastBaseline::new(*p)?),
            Self::QuantilePicker(p) => Box::new(QuantilePicker::new(*p)?),
            Self::DpOptimised(p) => Box::new(DpOptimised::new(*p)?),
            #[cfg(feature = "optimization")]
            Self::Optimised(p) => Box::new(super::Optimised::new(*p)?),
            #[cfg(feature = "optimization")]
            Self::OptimisedFcas(p) => Box::new(super::OptimisedFcas::new(*p)?),
            #[cfg(not(feature = "optimization"))]
            Self::Optimised(_) | Self::OptimisedFcas(_) => {
                return Err(StrategyError::OptimisationUnavailable(self.label()))
            }
        })
    }
}

impl fmt::Display for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// `DpOptimised`, `dp-optimised` and `dp_optimised` all name the same kind
fn canonical_kind(name: &str) -> Option<&'static str> {
    let squashed: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    KINDS
        .iter()
        .find(|k| k.replace('_', "") == squashed)
        .copied()
}

fn parse_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<u64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

impl FromStr for StrategyConfig {
    type Err = StrategyError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (name, params) = match input.split_once(':') {
            Some((name, params)) => (name.trim(), params.trim()),
            None => (input.trim(), ""),
        };
        let kind = canonical_kind(name).ok_or_else(|| StrategyError::Unknown(name.to_string()))?;

        let mut map = Map::new();
        map.insert("kind".into(), Value::from(kind));
        for pair in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| StrategyError::Parse {
                input: input.to_string(),
                reason: format!("expected key=value, got '{pair}'"),
            })?;
            map.insert(key.trim().to_string(), parse_value(value.trim()));
        }

        serde_json::from_value(Value::Object(map)).map_err(|e| StrategyError::Parse {
            input: input.to_string(),
            reason: e.to_string(),
        })
    }
}
