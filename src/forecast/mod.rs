pub mod cache;
pub mod merge;
pub mod metrics;

pub use cache::*;
pub use merge::*;
pub use metrics::*;

use anyhow::Result;
use chrono::NaiveDateTime;

use crate::data::{ForecastProduct, MarketDataSource};
use crate::domain::{timeline, Region};

/// Build (or load from `cache`) the merged one-day forecast for `[start, end)`.
pub async fn one_day_forecast(
    source: &dyn MarketDataSource,
    region: Region,
    start: NaiveDateTime,
    end: NaiveDateTime,
    settings: &ForecastSettings,
    cache: Option<&ForecastCache>,
) -> Result<ForecastTable> {
    let cache_path = cache.map(|c| c.path_for(&source.cache_namespace(), region, start, end, settings));
    if let (Some(cache), Some(path)) = (cache, cache_path.as_deref()) {
        if let Some(table) = cache.load(path).await {
            return Ok(table);
        }
    }

    let (p5min, predispatch) = tokio::try_join!(
        source.forecast_runs(ForecastProduct::P5Min, region, start, end),
        source.forecast_runs(ForecastProduct::Predispatch, region, start, end),
    )?;
    let timestamps = timeline(start, end);
    let table = merge_one_day_forecast(region, &timestamps, &p5min, &predispatch, settings);

    if let (Some(cache), Some(path)) = (cache, cache_path.as_deref()) {
        if let Err(e) = cache.store(path, &table).await {
            tracing::warn!(error = %e, "failed to cache one-day forecast");
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_market_timestamp;
    use crate::simulation::{SyntheticMarket, SyntheticMarketConfig};

    #[tokio::test]
    async fn test_cached_table_matches_fresh_build() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ForecastCache::new(dir.path());
        let start = parse_market_timestamp("2023-01-01 00:00").unwrap();
        let end = parse_market_timestamp("2023-01-01 02:00").unwrap();
        let relaxed = ForecastSettings {
            steps: 24,
            ..Default::default()
        };
        let strict = ForecastSettings {
            p5min_max_age_minutes: 0,
            predispatch_max_age_minutes: 0,
            ..relaxed.clone()
        };

        let market = SyntheticMarket::new(SyntheticMarketConfig::default());
        one_day_forecast(&market, Region::SA1, start, end, &relaxed, Some(&cache))
            .await
            .unwrap();
        let cached = one_day_forecast(&market, Region::SA1, start, end, &strict, Some(&cache))
            .await
            .unwrap();
        let fresh = one_day_forecast(&market, Region::SA1, start, end, &strict, None)
            .await
            .unwrap();
        assert_eq!(cached, fresh);

        // Same seed, different generator: entries are not shared
        let dearer = SyntheticMarket::new(SyntheticMarketConfig {
            base_price: 5000.0,
            ..Default::default()
        });
        let cached = one_day_forecast(&dearer, Region::SA1, start, end, &relaxed, Some(&cache))
            .await
            .unwrap();
        let fresh = one_day_forecast(&dearer, Region::SA1, start, end, &relaxed, None)
            .await
            .unwrap();
        assert_eq!(cached, fresh);
    }
}
