use serde::{Deserialize, Serialize};

use super::{Observation, Strategy, StrategyError};
use crate::domain::{Action, INTERVALS_PER_DAY};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DpParams {
    /// Penalty per MWh moved ($/MWh), discourages marginal cycling
    pub gamma: f64,
    /// Forecast steps considered
    pub horizon: usize,
    /// Number of discrete SOC levels
    pub n_soc: usize,
}

impl Default for DpParams {
    fn default() -> Self {
        Self {
            gamma: 0.0,
            horizon: INTERVALS_PER_DAY,
            n_soc: 100,
        }
    }
}

/// Dynamic programme over discretised SOC levels.
///
/// Each interval the battery may idle, charge at full power or discharge at
/// full power; the cheapest path over the horizon is found by backward
/// induction and its first move is taken.
#[derive(Debug, Clone)]
pub struct DpOptimised {
    params: DpParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    Idle,
    Charge,
    Discharge,
}

impl DpOptimised {
    pub fn new(params: DpParams) -> Result<Self, StrategyError> {
        if params.horizon == 0 {
            return Err(StrategyError::InvalidParameter {
                strategy: "DpOptimised",
                parameter: "horizon",
                reason: "horizon must be positive".into(),
            });
        }
        if params.n_soc < 2 {
            return Err(StrategyError::InvalidParameter {
                strategy: "DpOptimised",
                parameter: "n_soc",
                reason: "need at least two SOC levels".into(),
            });
        }
        if !(params.gamma.is_finite() && params.gamma >= 0.0) {
            return Err(StrategyError::InvalidParameter {
                strategy: "DpOptimised",
                parameter: "gamma",
                reason: format!("{} is not a non-negative number", params.gamma),
            });
        }
        Ok(Self { params })
    }

    fn solve(&self, prices: &[f64], obs: &Observation<'_>) -> Move {
        let n_soc = self.params.n_soc;
        let step = obs.c_max / (n_soc - 1) as f64;
        if !(step > 0.0) || prices.is_empty() {
            return Move::Idle;
        }

        let energy = obs.p_max * obs.dt;
        let di_chg = ((energy * obs.eta_chg / step).round() as usize).max(1);
        let di_dchg = ((energy / (obs.eta_dchg * step)).round() as usize).max(1);
        let start = ((obs.c_soc / step).round().max(0.0) as usize).min(n_soc - 1);

        let gamma = self.params.gamma;
        let cost_chg = |price: f64| (price + gamma) * energy;
        let cost_dchg = |price: f64| (-price + gamma) * energy;

        // next[i] = minimum cost from step t+1 onwards at level i
        let mut next = vec![0.0f64; n_soc];
        let mut cur = vec![0.0f64; n_soc];
        for &price in prices[1..].iter().rev() {
            for i in 0..n_soc {
                let mut best = next[i];
                if i + di_chg < n_soc {
                    best = best.min(cost_chg(price) + next[i + di_chg]);
                }
                if i >= di_dchg {
                    best = best.min(cost_dchg(price) + next[i - di_dchg]);
                }
                cur[i] = best;
            }
            std::mem::swap(&mut next, &mut cur);
        }

        // First step compared explicitly; ties keep idle, then charge
        let price = prices[0];
        let mut best = (next[start], Move::Idle);
        if start + di_chg < n_soc {
            let v = cost_chg(price) + next[start + di_chg];
            if v < best.0 {
                best = (v, Move::Charge);
            }
        }
        if start >= di_dchg {
            let v = cost_dchg(price) + next[start - di_dchg];
            if v < best.0 {
                best = (v, Move::Discharge);
            }
        }
        best.1
    }
}

impl Strategy for DpOptimised {
    fn name(&self) -> &str {
        "DpOptimised"
    }

    fn action(&self, obs: &Observation<'_>) -> Result<Action, StrategyError> {
        let prices = obs.horizon(self.params.horizon);
        if prices.is_empty() || prices.iter().any(|p| p.is_nan()) {
            return Ok(Action::idle());
        }
        let action = match self.solve(prices, obs) {
            Move::Idle => Action::idle(),
            Move::Charge => Action::charge(1.0),
            Move::Discharge => Action::discharge(1.0),
        };
        tracing::trace!(timestamp = %obs.timestamp, energy = action.energy, "dp decision");
        Ok(action)
    }
}
