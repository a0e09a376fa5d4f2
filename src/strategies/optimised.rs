//! Linear-programming dispatch over the forecast horizon.
//!
//! The formulation considers:
//! - Energy prices over the horizon
//! - SOC bounds `[0, c_max]`
//! - Charge/discharge power limits
//! - Charging and discharging efficiency losses
//! - A throughput penalty `gamma`
//!
//! Without integer variables, negative prices can make the plan charge and
//! discharge in the same interval to burn energy. Only the net first-step
//! power is dispatched, so a full battery at negative prices sees a charge
//! request that its headroom limit reduces to nothing.

use good_lp::solvers::minilp::minilp;
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel};

use super::{Observation, OptimisedParams, Strategy, StrategyError};
use crate::domain::Action;

/// Allocations below this (MW) are treated as zero
pub const TOLERANCE: f64 = 1e-4;

/// Energy-only LP strategy.
#[derive(Debug, Clone)]
pub struct Optimised {
    params: OptimisedParams,
}

impl Optimised {
    pub fn new(params: OptimisedParams) -> Result<Self, StrategyError> {
        params.validate("Optimised")?;
        Ok(Self { params })
    }

    /// Net power (MW, positive charging) for the first step of the optimal plan
    fn solve_lp(&self, prices: &[f64], obs: &Observation<'_>) -> Result<f64, good_lp::ResolutionError> {
        let n = prices.len();
        let dt = obs.dt;
        let gamma = self.params.gamma;
        let chg_gain = obs.eta_chg * dt;
        let dchg_loss = dt / obs.eta_dchg;

        let mut problem = ProblemVariables::new();
        let charge = problem.add_vector(variable().min(0.0).max(obs.p_max), n);
        let discharge = problem.add_vector(variable().min(0.0).max(obs.p_max), n);
        let soc = problem.add_vector(variable().min(0.0).max(obs.c_max), n);

        let revenue: Expression = (0..n)
            .map(|t| {
                (prices[t] - gamma) * dt * discharge[t] - (prices[t] + gamma) * dt * charge[t]
            })
            .sum();

        let mut model = problem.maximise(revenue).using(minilp);

        // SOC dynamics: soc[t] = soc[t-1] + eta_chg*charge*dt - discharge*dt/eta_dchg
        model = model.with(constraint!(
            soc[0] - chg_gain * charge[0] + dchg_loss * discharge[0] == obs.c_soc
        ));
        for t in 1..n {
            model = model.with(constraint!(
                soc[t] - soc[t - 1] - chg_gain * charge[t] + dchg_loss * discharge[t] == 0.0
            ));
        }

        let solution = model.solve()?;
        Ok(solution.value(charge[0]) - solution.value(discharge[0]))
    }
}

impl Strategy for Optimised {
    fn name(&self) -> &str {
        "Optimised"
    }

    fn action(&self, obs: &Observation<'_>) -> Result<Action, StrategyError> {
        let prices = obs.horizon(self.params.horizon);
        if prices.is_empty() || prices.iter().any(|p| p.is_nan()) {
            return Ok(Action::idle());
        }

        match self.solve_lp(prices, obs) {
            Ok(net) if net.abs() >= TOLERANCE => Ok(Action::energy(net / obs.p_max)),
            Ok(_) => Ok(Action::idle()),
            Err(e) => {
                tracing::warn!(
                    timestamp = %obs.timestamp,
                    error = %e,
                    "optimiser failed, defaulting to no action"
                );
                Ok(Action::idle())
            }
        }
    }
}
