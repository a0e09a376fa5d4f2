//! Post-run analysis: scorecards comparing strategies and CSV exports for
//! plotting elsewhere.

pub mod export;
pub mod scorecard;

pub use export::*;
pub use scorecard::*;

use std::collections::HashMap;

use crate::backtest::BacktestResults;

/// Strategy names for display, de-duplicated as `Name (2)`, `Name (3)`...
pub fn result_labels<'a, I>(results: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a BacktestResults>,
{
    let mut seen: HashMap<&str, usize> = HashMap::new();
    results
        .into_iter()
        .map(|r| {
            let count = seen.entry(r.strategy.as_str()).or_insert(0);
            *count += 1;
            if *count == 1 {
                r.strategy.clone()
            } else {
                format!("{} ({})", r.strategy, count)
            }
        })
        .collect()
}
