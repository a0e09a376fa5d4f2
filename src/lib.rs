//! BESSie: backtesting battery dispatch strategies against NEM market data.
//!
//! Realised prices and AEMO P5MIN/PREDISPATCH forecasts are loaded through a
//! [`data::MarketDataSource`], merged into per-interval forecasts
//! ([`forecast`]) and replayed against a [`strategies::Strategy`] by the
//! [`backtest`] engine. [`analysis`] summarises and exports the runs.

pub mod analysis;
pub mod backtest;
pub mod config;
pub mod data;
pub mod domain;
pub mod forecast;
pub mod simulation;
pub mod strategies;
pub mod telemetry;
