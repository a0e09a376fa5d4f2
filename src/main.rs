use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

use bessie::analysis::{export_forecast, export_timeseries, Scorecard};
use bessie::backtest::{
    run_backtest, run_sweep, BacktestInputData, BacktestResults, ForecastMode, NamedSpec, SweepPlan,
};
use bessie::config::{Config, DataSourceKind};
use bessie::domain::{parse_market_timestamp, Region};
use bessie::forecast::{lead_time_accuracy, one_day_forecast, ForecastSettings};
use bessie::strategies::StrategyConfig;
use bessie::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "bessie", version, about = "Backtest battery dispatch strategies against NEM prices")]
struct Cli {
    /// Configuration file (defaults to config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Override the configured market data source
    #[arg(long, global = true, value_enum)]
    source: Option<DataSourceKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Backtest one or more strategies in a region
    Backtest(BacktestArgs),
    /// Backtest every region, battery and strategy combination
    Sweep(SweepArgs),
    /// Export the merged one-day forecast as CSV
    Forecast(ForecastArgs),
    /// Forecast accuracy by lead time
    Accuracy(AccuracyArgs),
}

#[derive(Args)]
struct Window {
    /// Start of the window (market time), e.g. "2023-01-01" or "2023-01-01 04:00"
    #[arg(long, value_parser = parse_time)]
    start: NaiveDateTime,

    /// End of the window (exclusive)
    #[arg(long, value_parser = parse_time)]
    end: NaiveDateTime,
}

#[derive(Args)]
struct BacktestArgs {
    #[arg(long)]
    region: Region,

    #[command(flatten)]
    window: Window,

    /// Strategy as `kind` or `kind:key=value,...`; repeat to compare
    #[arg(long = "strategy", required = true)]
    strategies: Vec<StrategyConfig>,

    #[arg(long, value_enum, default_value_t = ForecastMode::Aemo)]
    mode: ForecastMode,

    /// Write results and scorecard as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the per-interval time series as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Args)]
struct SweepArgs {
    #[arg(long = "region", required = true)]
    regions: Vec<Region>,

    #[command(flatten)]
    window: Window,

    #[arg(long = "strategy", required = true)]
    strategies: Vec<StrategyConfig>,

    /// Battery as `name:p_max:e_max`; defaults to the configured battery
    #[arg(long = "battery", value_parser = parse_battery)]
    batteries: Vec<(String, f64, f64)>,

    #[arg(long, value_enum, default_value_t = ForecastMode::Aemo)]
    mode: ForecastMode,

    /// Write every outcome as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Args)]
struct ForecastArgs {
    #[arg(long)]
    region: Region,

    #[command(flatten)]
    window: Window,

    #[arg(long)]
    out: PathBuf,
}

#[derive(Args)]
struct AccuracyArgs {
    #[arg(long)]
    region: Region,

    #[command(flatten)]
    window: Window,

    /// Lead times in intervals
    #[arg(long, value_delimiter = ',', default_values_t = [0, 1, 6, 12, 72, 144, 287])]
    leads: Vec<usize>,
}

fn parse_time(raw: &str) -> Result<NaiveDateTime, String> {
    parse_market_timestamp(raw).ok_or_else(|| format!("unrecognised timestamp '{raw}'"))
}

fn parse_battery(raw: &str) -> Result<(String, f64, f64), String> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [name, p_max, e_max] = parts.as_slice() else {
        return Err(format!("expected name:p_max:e_max, got '{raw}'"));
    };
    let number = |s: &str| s.trim().parse::<f64>().map_err(|e| format!("'{s}': {e}"));
    Ok((name.trim().to_string(), number(p_max)?, number(e_max)?))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

#[derive(Serialize)]
struct BacktestReport<'a> {
    scorecard: &'a Scorecard,
    results: &'a [BacktestResults],
}

#[derive(Serialize)]
struct OutcomeReport<'a> {
    region: Region,
    battery: &'a str,
    strategy: &'a str,
    results: Option<&'a BacktestResults>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(source) = cli.source {
        cfg.data.source = source;
    }
    let source = cfg.data.market_data(&cfg.synthetic);
    let cache = cfg.data.forecast_cache();
    info!(source = %source.cache_namespace(), cache = cache.is_some(), "bessie starting");

    match cli.command {
        Command::Backtest(args) => {
            let data = BacktestInputData::load(
                args.mode,
                source.as_ref(),
                args.region,
                args.window.start,
                args.window.end,
                &cfg.forecast,
                cache.as_ref(),
            )
            .await?;

            let spec = cfg.battery.spec();
            let options = cfg.battery.options();
            let data = std::sync::Arc::new(data);
            let mut results = Vec::with_capacity(args.strategies.len());
            for config in args.strategies {
                let strategy = config.build()?;
                let data = std::sync::Arc::clone(&data);
                let run = tokio::task::spawn_blocking(move || {
                    run_backtest(&data, &spec, strategy.as_ref(), &options)
                })
                .await??;
                results.push(run);
            }

            let refs: Vec<&BacktestResults> = results.iter().collect();
            let scorecard = Scorecard::build(&data, &refs);
            println!("{scorecard}");

            if let Some(path) = &args.csv {
                export_timeseries(&data, &refs, create(path)?)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), "time series written");
            }
            if let Some(path) = &args.json {
                let report = BacktestReport {
                    scorecard: &scorecard,
                    results: &results,
                };
                serde_json::to_writer_pretty(create(path)?, &report)?;
                info!(path = %path.display(), "results written");
            }
        }

        Command::Sweep(args) => {
            let base = cfg.battery.spec();
            let specs = if args.batteries.is_empty() {
                vec![NamedSpec {
                    name: "configured".into(),
                    spec: base,
                }]
            } else {
                args.batteries
                    .into_iter()
                    .map(|(name, p_max, e_max)| NamedSpec {
                        name,
                        spec: bessie::domain::BatterySpec { p_max, e_max, ..base },
                    })
                    .collect()
            };
            let plan = SweepPlan {
                regions: args.regions,
                specs,
                strategies: args.strategies,
                start: args.window.start,
                end: args.window.end,
                mode: args.mode,
                settings: cfg.forecast.clone(),
                options: cfg.battery.options(),
                max_parallel: cfg.sweep.max_parallel,
            };

            let report = run_sweep(&plan, source.as_ref(), cache.as_ref()).await;
            for (region, data) in &report.inputs {
                for named in &plan.specs {
                    let results: Vec<&BacktestResults> = report
                        .outcomes
                        .iter()
                        .filter(|o| o.region == *region && o.spec_name == named.name)
                        .filter_map(|o| o.result.as_ref().ok())
                        .collect();
                    println!("== {} / {} ==", region, named.name);
                    println!("{}", Scorecard::build(data, &results));
                }
            }
            for failure in report.failures() {
                if let Err(e) = &failure.result {
                    eprintln!(
                        "FAILED {} / {} / {}: {e:#}",
                        failure.region, failure.spec_name, failure.strategy
                    );
                }
            }

            if let Some(path) = &args.json {
                let outcomes: Vec<OutcomeReport> = report
                    .outcomes
                    .iter()
                    .map(|o| OutcomeReport {
                        region: o.region,
                        battery: &o.spec_name,
                        strategy: &o.strategy,
                        results: o.result.as_ref().ok(),
                        error: o.result.as_ref().err().map(|e| format!("{e:#}")),
                    })
                    .collect();
                serde_json::to_writer_pretty(create(path)?, &outcomes)?;
                info!(path = %path.display(), "sweep outcomes written");
            }
            if report.failures().count() == report.outcomes.len() && !report.outcomes.is_empty() {
                bail!("every scenario failed");
            }
        }

        Command::Forecast(args) => {
            let table = one_day_forecast(
                source.as_ref(),
                args.region,
                args.window.start,
                args.window.end,
                &cfg.forecast,
                cache.as_ref(),
            )
            .await?;
            export_forecast(&table, create(&args.out)?)
                .with_context(|| format!("writing {}", args.out.display()))?;
            info!(rows = table.len(), path = %args.out.display(), "forecast written");
        }

        Command::Accuracy(args) => {
            let settings = ForecastSettings {
                steps: cfg.forecast.steps.max(args.leads.iter().max().map_or(1, |l| l + 1)),
                ..cfg.forecast.clone()
            };
            let data = BacktestInputData::from_aemo_forecasts(
                source.as_ref(),
                args.region,
                args.window.start,
                args.window.end,
                &settings,
                cache.as_ref(),
            )
            .await?;
            let accuracy = lead_time_accuracy(&data.forecast.rows, &data.prices.energy, &args.leads);
            if accuracy.is_empty() {
                return Err(anyhow!("no forecast could be compared with realised prices"));
            }
            println!("Forecast accuracy for {} ({} to {})", args.region, data.start, data.end);
            for lead in &accuracy {
                println!("{:>5} min  {}", lead.lead_minutes, lead.metrics);
            }
        }
    }

    Ok(())
}
