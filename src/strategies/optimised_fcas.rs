//! Joint energy and contingency FCAS dispatch as one linear programme.
//!
//! Decision variables are MW allocations per step in action-vector order
//! `[charge, discharge, R6, R60, R5, L6, L60, L5]`. The discharge side
//! (discharge + raise services) and the charge side (charge + lower
//! services) each share `p_max`. FCAS enablement moves SOC by its expected
//! energy: event probability times full-response duration.

use good_lp::solvers::minilp::minilp;
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};
use strum::IntoEnumIterator;

use super::optimised::TOLERANCE;
use super::{Observation, OptimisedParams, Strategy, StrategyError};
use crate::domain::{Action, FcasMarket, FcasValues, FCAS_MARKETS};

const COLUMNS: usize = 2 + FCAS_MARKETS;
const CHARGE: usize = 0;
const DISCHARGE: usize = 1;

fn column(market: FcasMarket) -> usize {
    2 + market.index()
}

#[derive(Debug, Clone)]
pub struct OptimisedFcas {
    params: OptimisedParams,
}

impl OptimisedFcas {
    pub fn new(params: OptimisedParams) -> Result<Self, StrategyError> {
        params.validate("OptimisedFcas")?;
        Ok(Self { params })
    }

    /// First-step allocations (MW) of the optimal plan
    fn solve_lp(
        &self,
        prices: &[f64],
        fcas: &[FcasValues],
        obs: &Observation<'_>,
    ) -> Result<[f64; COLUMNS], good_lp::ResolutionError> {
        let n = prices.len();
        let dt = obs.dt;
        let gamma = self.params.gamma;

        let mut problem = ProblemVariables::new();
        let p: Vec<Vec<Variable>> = (0..n)
            .map(|_| problem.add_vector(variable().min(0.0).max(obs.p_max), COLUMNS))
            .collect();
        let soc = problem.add_vector(variable().min(0.0).max(obs.c_max), n);

        let mut objective = Expression::from(0.0);
        for t in 0..n {
            objective += (prices[t] - gamma) * dt * p[t][DISCHARGE];
            objective -= (prices[t] + gamma) * dt * p[t][CHARGE];
            for m in FcasMarket::iter() {
                objective += (fcas[t][m.index()] - gamma) * dt * p[t][column(m)];
            }
        }

        let mut model = problem.maximise(objective).using(minilp);

        for t in 0..n {
            let mut raise_pool: Expression = p[t][DISCHARGE].into();
            let mut lower_pool: Expression = p[t][CHARGE].into();
            // Expected SOC change over the step
            let mut delta: Expression =
                obs.eta_chg * dt * p[t][CHARGE] - dt / obs.eta_dchg * p[t][DISCHARGE];
            for m in FcasMarket::iter() {
                let x = p[t][column(m)];
                if m.is_raise() {
                    raise_pool += x;
                    delta -= m.expected_hours() / obs.eta_dchg * x;
                } else {
                    lower_pool += x;
                    delta += m.expected_hours() * obs.eta_chg * x;
                }
            }
            model = model
                .with(constraint!(raise_pool <= obs.p_max))
                .with(constraint!(lower_pool <= obs.p_max));
            model = if t == 0 {
                model.with(constraint!(soc[0] - delta == obs.c_soc))
            } else {
                model.with(constraint!(soc[t] - soc[t - 1] - delta == 0.0))
            };
        }

        let solution = model.solve()?;
        let mut first = [0.0; COLUMNS];
        for (k, var) in p[0].iter().enumerate() {
            first[k] = solution.value(*var);
        }
        Ok(first)
    }
}

impl Strategy for OptimisedFcas {
    fn name(&self) -> &str {
        "OptimisedFcas"
    }

    fn action(&self, obs: &Observation<'_>) -> Result<Action, StrategyError> {
        let fcas = obs
            .fcas_forecast
            .ok_or(StrategyError::MissingFcasForecast("OptimisedFcas"))?;

        let prices = obs.horizon(self.params.horizon);
        let n = prices.len().min(fcas.len());
        let (prices, fcas) = (&prices[..n], &fcas[..n]);
        if n == 0 || prices.iter().any(|p| p.is_nan()) || fcas.iter().flatten().any(|p| p.is_nan()) {
            return Ok(Action::idle());
        }

        match self.solve_lp(prices, fcas, obs) {
            Ok(first) => {
                let x = first.map(|mw| if mw < TOLERANCE { 0.0 } else { (mw / obs.p_max).clamp(0.0, 1.0) });
                Ok(Action::from_allocation(&x))
            }
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
