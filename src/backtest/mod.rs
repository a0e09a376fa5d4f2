//! Backtesting
//!
//! Replays a strategy over historical (or synthetic) intervals:
//! - [`BacktestInputData`]: realised prices plus the forecast the strategy sees
//! - [`run_backtest`]: the interval loop, battery physics and settlement
//! - [`run_sweep`]: many regions, batteries and strategies on a worker pool

pub mod engine;
pub mod input;
pub mod results;
pub mod sweep;

pub use engine::*;
pub use input::*;
pub use results::*;
pub use sweep::*;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::BatteryError;
use crate::strategies::StrategyError;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("backtest window is empty: start {start} is not before end {end}")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("{series} has {actual} intervals, expected {expected}")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid battery: {0}")]
    Battery(#[from] BatteryError),

    #[error("{strategy} failed at interval {index} ({timestamp})")]
    Strategy {
        strategy: String,
        index: usize,
        timestamp: NaiveDateTime,
        #[source]
        source: StrategyError,
    },

    #[error("invalid backtest options: {0}")]
    Options(#[from] validator::ValidationErrors),
}
