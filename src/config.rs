use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::backtest::BacktestOptions;
use crate::data::{CsvMarketData, MarketDataSource};
use crate::domain::BatterySpec;
use crate::forecast::{ForecastCache, ForecastSettings};
use crate::simulation::{SyntheticMarket, SyntheticMarketConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "BESSIE__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub data: DataConfig,
    #[validate(nested)]
    pub forecast: ForecastSettings,
    #[validate(nested)]
    pub battery: BatteryConfig,
    #[validate(nested)]
    pub synthetic: SyntheticMarketConfig,
    #[validate(nested)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// AEMO CSV tables under `data_dir`
    Csv,
    /// Seeded synthetic market, no files needed
    #[default]
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DataConfig {
    pub source: DataSourceKind,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub use_cache: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: DataSourceKind::Synthetic,
            data_dir: PathBuf::from("data/aemo"),
            cache_dir: PathBuf::from("data/cache"),
            use_cache: true,
        }
    }
}

impl DataConfig {
    pub fn market_data(&self, synthetic: &SyntheticMarketConfig) -> Arc<dyn MarketDataSource> {
        match self.source {
            DataSourceKind::Csv => Arc::new(CsvMarketData::new(&self.data_dir)),
            DataSourceKind::Synthetic => Arc::new(SyntheticMarket::new(synthetic.clone())),
        }
    }

    pub fn forecast_cache(&self) -> Option<ForecastCache> {
        self.use_cache.then(|| ForecastCache::new(&self.cache_dir))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_battery"))]
pub struct BatteryConfig {
    /// Power rating (MW)
    #[validate(range(exclusive_min = 0.0))]
    pub p_max: f64,
    /// Energy capacity (MWh)
    #[validate(range(exclusive_min = 0.0))]
    pub e_max: f64,
    #[validate(range(min = 0.0, exclusive_max = 1.0))]
    pub deg: f64,
    pub eta_chg: f64,
    pub eta_dchg: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc_fraction: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        let spec = BatterySpec::default();
        Self {
            p_max: spec.p_max,
            e_max: spec.e_max,
            deg: spec.deg,
            eta_chg: spec.eta_chg,
            eta_dchg: spec.eta_dchg,
            initial_soc_fraction: BacktestOptions::default().initial_soc_fraction,
        }
    }
}

impl BatteryConfig {
    pub fn spec(&self) -> BatterySpec {
        BatterySpec {
            p_max: self.p_max,
            e_max: self.e_max,
            deg: self.deg,
            eta_chg: self.eta_chg,
            eta_dchg: self.eta_dchg,
        }
    }

    pub fn options(&self) -> BacktestOptions {
        BacktestOptions {
            initial_soc_fraction: self.initial_soc_fraction,
        }
    }
}

fn validate_battery(battery: &BatteryConfig) -> Result<(), ValidationError> {
    battery.spec().validate().map_err(|e| {
        let mut err = ValidationError::new("battery");
        err.message = Some(e.to_string().into());
        err
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SweepConfig {
    #[validate(range(min = 1, max = 256))]
    pub max_parallel: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_parallel: std::thread::available_parallelism()
                .map(|n| n.get().min(32))
                .unwrap_or(4),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `BESSIE__`-prefixed environment.
    ///
    /// A missing default file is fine; an explicitly requested one must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = match path {
            Some(path) => {
                anyhow::ensure!(path.exists(), "config file {} not found", path.display());
                Self::figment(path)
            }
            None => Self::figment(Path::new(DEFAULT_CONFIG_PATH)),
        };
        let config: Self = figment.extract().context("invalid configuration")?;
        config.validate().context("configuration failed validation")?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.battery.spec(), BatterySpec::default());
        assert_eq!(config.battery.options(), BacktestOptions::default());
    }

    #[test]
    fn test_file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bessie.toml",
                r#"
                [data]
                source = "csv"
                data_dir = "/srv/aemo"

                [battery]
                p_max = 100.0
                e_max = 200.0

                [forecast]
                steps = 144
                "#,
            )?;
            jail.set_env("BESSIE__BATTERY__DEG", "0.0001");
            jail.set_env("BESSIE__SWEEP__MAX_PARALLEL", "2");

            let config = Config::load(Some(Path::new("bessie.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.data.source, DataSourceKind::Csv);
            assert_eq!(config.data.data_dir, PathBuf::from("/srv/aemo"));
            assert_eq!(config.battery.p_max, 100.0);
            assert_eq!(config.battery.deg, 0.0001);
            assert_eq!(config.battery.eta_chg, 0.90);
            assert_eq!(config.forecast.steps, 144);
            assert_eq!(config.forecast.p5min_steps, 12);
            assert_eq!(config.sweep.max_parallel, 2);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[battery]\neta_chg = 1.5\n")?;
            assert!(Config::load(Some(Path::new("bad.toml"))).is_err());

            jail.create_file("bad_forecast.toml", "[forecast]\np5min_steps = 20\n")?;
            assert!(Config::load(Some(Path::new("bad_forecast.toml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/bessie.toml"))).is_err());
    }
}
