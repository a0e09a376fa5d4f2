//! AEMO market data ingestion.
//!
//! Raw tables are read from CSV ([`aemo`]), cleaned of intervention periods,
//! shifted to interval-start timestamps and exposed as realised price series
//! ([`prices`]) or forecast runs ([`forecasts`]) through a
//! [`MarketDataSource`].

pub mod aemo;
pub mod forecasts;
pub mod prices;
pub mod source;

use std::path::PathBuf;
use thiserror::Error;

pub use aemo::AemoTable;
pub use forecasts::{ForecastProduct, ForecastRecord, ForecastRuns, MarketPrice};
pub use prices::{PriceRecord, PriceSeries};
pub use source::{CsvMarketData, MarketDataSource};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("{table}: missing column {column}")]
    MissingColumn { table: &'static str, column: String },

    #[error("{table}: no rows for region {region} between {start} and {end}")]
    NoData {
        table: &'static str,
        region: String,
        start: chrono::NaiveDateTime,
        end: chrono::NaiveDateTime,
    },
}

/// Counters collected while cleaning a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows: usize,
    pub kept: usize,
    pub interventions: usize,
    pub malformed: usize,
}

impl LoadStats {
    pub(crate) fn report(&self, table: &'static str) {
        if self.interventions > 0 {
            tracing::warn!(
                table,
                count = self.interventions,
                "found intervention periods in data, filtering them out"
            );
        }
        if self.malformed > 0 {
            tracing::warn!(table, count = self.malformed, "skipped malformed rows");
        }
        tracing::debug!(table, rows = self.rows, kept = self.kept, "table cleaned");
    }
}

/// `true` when an `INTERVENTION` flag marks the row as an intervention run
pub(crate) fn is_intervention(flag: Option<&str>) -> bool {
    flag.and_then(aemo::parse_number)
        .map(|v| v != 0.0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervention_flag() {
        assert!(!is_intervention(None));
        assert!(!is_intervention(Some("0")));
        assert!(is_intervention(Some("1")));
        assert!(!is_intervention(Some("n/a")));
    }
}
