use serde::{Deserialize, Serialize};
use std::time::Instant;
use strum::IntoEnumIterator;
use validator::Validate;

use super::{BacktestError, BacktestInputData, BacktestResults};
use crate::domain::{trading_date, BatterySpec, BatteryState, Dispatch, FcasMarket, FcasValues};
use crate::strategies::{Observation, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BacktestOptions {
    /// Starting SOC as a fraction of `e_max`
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc_fraction: f64,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            initial_soc_fraction: 0.5,
        }
    }
}

/// Run `strategy` over every interval of `data`.
pub fn run_backtest(
    data: &BacktestInputData,
    spec: &BatterySpec,
    strategy: &dyn Strategy,
    options: &BacktestOptions,
) -> Result<BacktestResults, BacktestError> {
    options.validate()?;
    spec.validate()?;
    let mut state = BatteryState::initial(spec, options.initial_soc_fraction)?;

    let started = Instant::now();
    let dt = data.dt;
    let mut results = BacktestResults::with_capacity(strategy.name(), *spec, data.len());
    let mut settlement = Settlement::default();
    let mut current_date = None;
    let mut actions_today = 0u32;

    tracing::info!(
        run_id = %results.run_id,
        strategy = strategy.name(),
        region = %data.region,
        start = %data.start,
        end = %data.end,
        p_max = spec.p_max,
        e_max = spec.e_max,
        "starting backtest"
    );

    for (index, &timestamp) in data.timestamps.iter().enumerate() {
        let date = trading_date(timestamp);
        if current_date != Some(date) {
            current_date = Some(date);
            actions_today = 0;
        }

        let row = &data.forecast.rows[index];
        let observation = Observation {
            timestamp,
            forecast: &row.energy,
            fcas_forecast: row.fcas.as_deref(),
            c_soc: state.c_soc,
            c_max: state.c_max,
            p_max: spec.p_max,
            eta_chg: spec.eta_chg,
            eta_dchg: spec.eta_dchg,
            last_price: index
                .checked_sub(1)
                .map_or(f64::NAN, |prev| data.prices.energy[prev]),
            actions_today,
            dt,
        };

        let action = strategy
            .action(&observation)
            .map_err(|source| BacktestError::Strategy {
                strategy: strategy.name().to_string(),
                index,
                timestamp,
                source,
            })?;

        let dispatch = state.apply(spec, &action, dt);
        if dispatch.is_action {
            actions_today += 1;
        }

        let energy_revenue = settlement.energy(&dispatch, data.prices.energy[index], dt);
        let fcas_revenue = settlement.fcas(&dispatch, data.prices.fcas_at(index), dt);

        tracing::debug!(
            %timestamp,
            power_mw = dispatch.power_mw,
            c_soc = dispatch.c_soc,
            revenue = energy_revenue + fcas_revenue,
            "interval dispatched"
        );
        results.record(&dispatch, energy_revenue, fcas_revenue);
    }

    if settlement.unpriced > 0 {
        tracing::warn!(
            run_id = %results.run_id,
            intervals = settlement.unpriced,
            "dispatched into intervals without a realised price, settled as zero"
        );
    }
    tracing::info!(
        run_id = %results.run_id,
        strategy = %results.strategy,
        revenue = results.total_revenue(),
        actions = results.action_count(),
        final_capacity = results.final_capacity(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "backtest complete"
    );

    Ok(results)
}

/// Revenue for one interval at realised prices
#[derive(Debug, Default)]
struct Settlement {
    unpriced: usize,
}

impl Settlement {
    fn energy(&mut self, dispatch: &Dispatch, price: f64, dt: f64) -> f64 {
        if price.is_nan() {
            if dispatch.power_mw != 0.0 {
                self.unpriced += 1;
            }
            return 0.0;
        }
        -dispatch.power_mw * dt * price
    }

    fn fcas(&mut self, dispatch: &Dispatch, prices: Option<&FcasValues>, dt: f64) -> f64 {
        let Some(prices) = prices else {
            return 0.0;
        };
        let mut revenue = 0.0;
        let mut unpriced = false;
        for market in FcasMarket::iter() {
            let mw = dispatch.fcas_mw[market.index()];
            let price = prices[market.index()];
            if price.is_nan() {
                unpriced |= mw != 0.0;
            } else {
                revenue += mw * price * dt;
            }
        }
        if unpriced {
            self.unpriced += 1;
        }
        revenue
    }
}
