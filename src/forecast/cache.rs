use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{ForecastSettings, ForecastTable};
use crate::domain::Region;

const FORMAT: &str = "%Y%m%dT%H%M";

/// Short hex digest of `value`'s JSON form, for cache keys.
pub fn config_digest<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&json);
    hex::encode(&digest[..8])
}

/// On-disk store of merged forecast tables, one bincode file per window.
#[derive(Debug, Clone)]
pub struct ForecastCache {
    dir: PathBuf,
}

impl ForecastCache {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: cache_dir.as_ref().join("one_day_forecast"),
        }
    }

    pub fn path_for(
        &self,
        namespace: &str,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
        settings: &ForecastSettings,
    ) -> PathBuf {
        let key = format!(
            "{namespace}_{region}_{}_{}_{}",
            start.format(FORMAT),
            end.format(FORMAT),
            config_digest(settings),
        );
        let sanitised: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{sanitised}.bin"))
    }

    /// Load a table if one is cached; unreadable entries count as misses.
    pub async fn load(&self, path: &Path) -> Option<ForecastTable> {
        let bytes = tokio::fs::read(path).await.ok()?;
        match bincode::deserialize::<ForecastTable>(&bytes) {
            Ok(table) => {
                tracing::info!(path = %path.display(), "loaded one-day forecast from cache");
                Some(table)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt forecast cache entry");
                None
            }
        }
    }

    pub async fn store(&self, path: &Path, table: &ForecastTable) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let bytes = bincode::serialize(table).context("failed to encode forecast table")?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "cached one-day forecast");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_market_timestamp;
    use crate::forecast::ForecastRow;

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ForecastCache::new(dir.path());
        let start = parse_market_timestamp("2023-01-01 00:00").unwrap();
        let end = parse_market_timestamp("2023-01-02 00:00").unwrap();
        let path = cache.path_for("csv:/data/aemo", Region::NSW1, start, end, &ForecastSettings::default());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("csv__data_aemo_NSW1_20230101T0000_20230102T0000_"));
        assert!(name.ends_with(".bin"));

        assert!(cache.load(&path).await.is_none());

        let table = ForecastTable {
            region: Region::NSW1,
            timestamps: vec![start],
            rows: vec![ForecastRow {
                energy: vec![1.0, 2.0],
                fcas: Some(vec![[0.5; 6]; 2]),
            }],
        };
        cache.store(&path, &table).await.unwrap();
        assert_eq!(cache.load(&path).await, Some(table));
    }

    #[test]
    fn test_key_covers_every_setting() {
        let cache = ForecastCache::new("cache");
        let start = parse_market_timestamp("2023-01-01 00:00").unwrap();
        let end = parse_market_timestamp("2023-01-02 00:00").unwrap();
        let path = |settings: &ForecastSettings| cache.path_for("synthetic", Region::SA1, start, end, settings);

        let defaults = ForecastSettings::default();
        let strict_p5min = ForecastSettings {
            p5min_max_age_minutes: 0,
            ..defaults.clone()
        };
        let strict_predispatch = ForecastSettings {
            predispatch_max_age_minutes: 0,
            ..defaults.clone()
        };
        assert_eq!(path(&defaults), path(&ForecastSettings::default()));
        assert_ne!(path(&defaults), path(&strict_p5min));
        assert_ne!(path(&defaults), path(&strict_predispatch));
        assert_ne!(path(&strict_p5min), path(&strict_predispatch));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ForecastCache::new(dir.path());
        std::fs::create_dir_all(dir.path().join("one_day_forecast")).unwrap();
        let path = dir.path().join("one_day_forecast").join("bad.bin");
        std::fs::write(&path, b"not bincode").unwrap();
        assert!(cache.load(&path).await.is_none());
    }
}
