//! # Market Simulation Module
//!
//! Synthetic stand-in for AEMO data so that strategies can be backtested,
//! demonstrated and tested without a local copy of the NEM archives.
//!
//! ```rust,no_run
//! use bessie::simulation::{SyntheticMarket, SyntheticMarketConfig};
//!
//! let market = SyntheticMarket::new(SyntheticMarketConfig {
//!     seed: 7,
//!     spike_probability: 0.01,
//!     ..Default::default()
//! });
//! ```

pub mod prices;

pub use prices::*;
