use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use super::{run_backtest, BacktestInputData, BacktestOptions, BacktestResults, ForecastMode};
use crate::data::MarketDataSource;
use crate::domain::{BatterySpec, Region};
use crate::forecast::{ForecastCache, ForecastSettings};
use crate::strategies::StrategyConfig;

/// A battery under test, named for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSpec {
    pub name: String,
    #[serde(flatten)]
    pub spec: BatterySpec,
}

/// Cartesian product of regions, batteries and strategies over one window.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub regions: Vec<Region>,
    pub specs: Vec<NamedSpec>,
    pub strategies: Vec<StrategyConfig>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub mode: ForecastMode,
    pub settings: ForecastSettings,
    pub options: BacktestOptions,
    /// Backtests running at once
    pub max_parallel: usize,
}

impl SweepPlan {
    pub fn scenario_count(&self) -> usize {
        self.regions.len() * self.specs.len() * self.strategies.len()
    }
}

/// Result of one `(region, battery, strategy)` scenario
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub region: Region,
    pub spec_name: String,
    pub strategy: String,
    pub result: Result<BacktestResults>,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    /// Input data for every region that loaded
    pub inputs: BTreeMap<Region, Arc<BacktestInputData>>,
    /// Outcomes in plan order
    pub outcomes: Vec<ScenarioOutcome>,
}

impl ScenarioOutcome {
    fn pending(region: Region, spec_name: &str, strategy: &str) -> Self {
        Self {
            region,
            spec_name: spec_name.to_string(),
            strategy: strategy.to_string(),
            result: Err(anyhow!("scenario task aborted before reporting")),
        }
    }
}

impl SweepReport {
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Successful results for `region`, in plan order
    pub fn results_for(&self, region: Region) -> Vec<&BacktestResults> {
        self.outcomes
            .iter()
            .filter(|o| o.region == region)
            .filter_map(|o| o.result.as_ref().ok())
            .collect()
    }
}

/// Run every scenario of `plan`.
///
/// Input data is loaded once per region. Backtests run on blocking workers,
/// at most `max_parallel` at a time; a failing scenario does not cancel the
/// others.
pub async fn run_sweep(
    plan: &SweepPlan,
    source: &dyn MarketDataSource,
    cache: Option<&ForecastCache>,
) -> SweepReport {
    let mut report = SweepReport::default();
    let mut load_errors: BTreeMap<Region, String> = BTreeMap::new();

    for &region in &plan.regions {
        let loaded = BacktestInputData::load(
            plan.mode,
            source,
            region,
            plan.start,
            plan.end,
            &plan.settings,
            cache,
        )
        .await
        .with_context(|| format!("loading {region} input data"));
        match loaded {
            Ok(data) => {
                report.inputs.insert(region, Arc::new(data));
            }
            Err(e) => {
                tracing::error!(%region, error = %format!("{e:#}"), "skipping region");
                load_errors.insert(region, format!("{e:#}"));
            }
        }
    }

    let semaphore = Arc::new(Semaphore::new(plan.max_parallel.max(1)));
    let mut tasks = JoinSet::new();
    let mut slots: Vec<ScenarioOutcome> = Vec::with_capacity(plan.scenario_count());

    tracing::info!(
        scenarios = plan.scenario_count(),
        max_parallel = plan.max_parallel,
        "starting sweep"
    );

    for &region in &plan.regions {
        for named in &plan.specs {
            for config in &plan.strategies {
                let index = slots.len();
                let strategy = config.label().to_string();

                let Some(data) = report.inputs.get(&region).cloned() else {
                    let reason = load_errors.get(&region).cloned().unwrap_or_default();
                    slots.push(ScenarioOutcome {
                        region,
                        spec_name: named.name.clone(),
                        strategy,
                        result: Err(anyhow!("input data unavailable: {reason}")),
                    });
                    continue;
                };
                slots.push(ScenarioOutcome::pending(region, &named.name, &strategy));

                let semaphore = Arc::clone(&semaphore);
                let config = config.clone();
                let named = named.clone();
                let options = plan.options;
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let spec = named.spec;
                    let result = tokio::task::spawn_blocking(move || -> Result<BacktestResults> {
                        let strategy = config.build()?;
                        Ok(run_backtest(&data, &spec, strategy.as_ref(), &options)?)
                    })
                    .await
                    .unwrap_or_else(|e| Err(anyhow!("backtest worker failed: {e}")));

                    let outcome = ScenarioOutcome {
                        region,
                        spec_name: named.name,
                        strategy,
                        result,
                    };
                    (index, outcome)
                });
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        settle(&mut slots, joined);
    }

    report.outcomes = slots;
    tracing::info!(
        completed = report.outcomes.len(),
        failed = report.failures().count(),
        "sweep finished"
    );
    report
}

/// Store a finished scenario in its plan slot. A task that never reported
/// leaves its slot holding the pending failure.
fn settle(slots: &mut [ScenarioOutcome], joined: Result<(usize, ScenarioOutcome), JoinError>) {
    match joined {
        Ok((index, outcome)) => {
            if let Err(e) = &outcome.result {
                tracing::warn!(
                    region = %outcome.region,
                    battery = %outcome.spec_name,
                    strategy = %outcome.strategy,
                    error = %format!("{e:#}"),
                    "scenario failed"
                );
            }
            slots[index] = outcome;
        }
        Err(e) => tracing::error!(error = %e, "sweep task aborted"),
    }
}
