use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{BatterySpec, Dispatch, FcasValues};

/// Per-interval record of one backtest run.
///
/// Every vector has one entry per interval of the input window; `c_soc` and
/// `c_max` are the values after the interval was dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResults {
    pub run_id: Uuid,
    pub strategy: String,
    pub spec: BatterySpec,
    /// Energy power actually dispatched (MW, positive charging)
    pub p_actions: Vec<f64>,
    /// FCAS capacity enabled (MW)
    pub fcas_mw: Vec<FcasValues>,
    pub c_soc: Vec<f64>,
    pub c_max: Vec<f64>,
    pub energy_revenue: Vec<f64>,
    pub fcas_revenue: Vec<f64>,
    pub revenue: Vec<f64>,
}

impl BacktestResults {
    pub(crate) fn with_capacity(strategy: impl Into<String>, spec: BatterySpec, n: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            strategy: strategy.into(),
            spec,
            p_actions: Vec::with_capacity(n),
            fcas_mw: Vec::with_capacity(n),
            c_soc: Vec::with_capacity(n),
            c_max: Vec::with_capacity(n),
            energy_revenue: Vec::with_capacity(n),
            fcas_revenue: Vec::with_capacity(n),
            revenue: Vec::with_capacity(n),
        }
    }

    pub(crate) fn record(&mut self, dispatch: &Dispatch, energy_revenue: f64, fcas_revenue: f64) {
        self.p_actions.push(dispatch.power_mw);
        self.fcas_mw.push(dispatch.fcas_mw);
        self.c_soc.push(dispatch.c_soc);
        self.c_max.push(dispatch.c_max);
        self.energy_revenue.push(energy_revenue);
        self.fcas_revenue.push(fcas_revenue);
        self.revenue.push(energy_revenue + fcas_revenue);
    }

    pub fn len(&self) -> usize {
        self.p_actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p_actions.is_empty()
    }

    pub fn total_revenue(&self) -> f64 {
        self.revenue.iter().sum()
    }

    pub fn total_energy_revenue(&self) -> f64 {
        self.energy_revenue.iter().sum()
    }

    pub fn total_fcas_revenue(&self) -> f64 {
        self.fcas_revenue.iter().sum()
    }

    pub fn cumulative_revenue(&self) -> Vec<f64> {
        self.revenue
            .iter()
            .scan(0.0, |acc, r| {
                *acc += r;
                Some(*acc)
            })
            .collect()
    }

    pub fn charging_intervals(&self) -> usize {
        self.p_actions.iter().filter(|&&p| p > 0.0).count()
    }

    pub fn discharging_intervals(&self) -> usize {
        self.p_actions.iter().filter(|&&p| p < 0.0).count()
    }

    pub fn idle_intervals(&self) -> usize {
        self.len() - self.charging_intervals() - self.discharging_intervals()
    }

    /// Intervals with a non-zero energy dispatch
    pub fn action_count(&self) -> usize {
        self.charging_intervals() + self.discharging_intervals()
    }

    /// Capacity at the end of the run, or the rated capacity if nothing ran
    pub fn final_capacity(&self) -> f64 {
        self.c_max.last().copied().unwrap_or(self.spec.e_max)
    }
}
