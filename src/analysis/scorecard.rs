use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

use super::result_labels;
use crate::backtest::{BacktestInputData, BacktestResults};
use crate::domain::Region;

/// Summary of one backtest run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScorecardEntry {
    pub label: String,
    pub total_revenue: f64,
    pub energy_revenue: f64,
    pub fcas_revenue: f64,
    pub revenue_per_day: f64,
    pub charging_intervals: usize,
    pub idle_intervals: usize,
    pub discharging_intervals: usize,
    pub charging_pct: f64,
    pub idle_pct: f64,
    pub discharging_pct: f64,
    pub total_actions: usize,
    pub actions_per_day: f64,
    pub final_capacity: f64,
    pub capacity_remaining_pct: f64,
}

/// Side-by-side comparison of runs over the same input window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scorecard {
    pub region: Region,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub days: f64,
    /// Rated capacity of the first run's battery (MWh)
    pub starting_capacity: f64,
    pub power_rating: f64,
    pub degradation_rate: f64,
    pub entries: Vec<ScorecardEntry>,
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

fn per_day(value: f64, days: f64) -> f64 {
    if days > 0.0 {
        value / days
    } else {
        0.0
    }
}

impl Scorecard {
    pub fn build(data: &BacktestInputData, results: &[&BacktestResults]) -> Self {
        let days = data.n_days();
        let labels = result_labels(results.iter().copied());
        let entries = results
            .iter()
            .zip(labels)
            .map(|(r, label)| {
                let n = r.len();
                let actions = r.action_count();
                ScorecardEntry {
                    label,
                    total_revenue: r.total_revenue(),
                    energy_revenue: r.total_energy_revenue(),
                    fcas_revenue: r.total_fcas_revenue(),
                    revenue_per_day: per_day(r.total_revenue(), days),
                    charging_intervals: r.charging_intervals(),
                    idle_intervals: r.idle_intervals(),
                    discharging_intervals: r.discharging_intervals(),
                    charging_pct: pct(r.charging_intervals(), n),
                    idle_pct: pct(r.idle_intervals(), n),
                    discharging_pct: pct(r.discharging_intervals(), n),
                    total_actions: actions,
                    actions_per_day: per_day(actions as f64, days),
                    final_capacity: r.final_capacity(),
                    capacity_remaining_pct: 100.0 * r.final_capacity() / r.spec.e_max,
                }
            })
            .collect();

        let spec = results.first().map(|r| r.spec).unwrap_or_default();
        Self {
            region: data.region,
            start: data.start,
            end: data.end,
            days,
            starting_capacity: spec.e_max,
            power_rating: spec.p_max,
            degradation_rate: spec.deg,
            entries,
        }
    }

    /// Entry with the highest total revenue
    pub fn best(&self) -> Option<&ScorecardEntry> {
        self.entries
            .iter()
            .max_by(|a, b| a.total_revenue.total_cmp(&b.total_revenue))
    }
}

impl fmt::Display for Scorecard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Region:            {}", self.region)?;
        writeln!(f, "Window:            {} to {} ({:.2} days)", self.start, self.end, self.days)?;
        writeln!(f, "Starting capacity: {:.1} MWh", self.starting_capacity)?;
        writeln!(f, "Power rating:      {:.1} MW", self.power_rating)?;
        writeln!(f, "Degradation rate:  {}", self.degradation_rate)?;
        writeln!(f)?;

        let width = self
            .entries
            .iter()
            .map(|e| e.label.len())
            .max()
            .unwrap_or(0)
            .max("Strategy".len());
        writeln!(
            f,
            "{:<width$}  {:>14}  {:>12}  {:>8}  {:>8}  {:>8}  {:>8}  {:>9}  {:>10}",
            "Strategy", "Revenue ($)", "$/day", "Chg %", "Idle %", "Dchg %", "Actions", "Actions/d", "Capacity %",
        )?;
        writeln!(f, "{}", "-".repeat(width + 100))?;
        for e in &self.entries {
            writeln!(
                f,
                "{:<width$}  {:>14.2}  {:>12.2}  {:>8.1}  {:>8.1}  {:>8.1}  {:>8}  {:>9.1}  {:>10.2}",
                e.label,
                e.total_revenue,
                e.revenue_per_day,
                e.charging_pct,
                e.idle_pct,
                e.discharging_pct,
                e.total_actions,
                e.actions_per_day,
                e.capacity_remaining_pct,
            )?;
        }
        Ok(())
    }
}
