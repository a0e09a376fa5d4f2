use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use super::forecasts::{parse_forecast_records, ForecastProduct, ForecastRuns};
use super::prices::{parse_dispatch_prices, PriceSeries, DISPATCHPRICE};
use super::{AemoTable, DataError};
use crate::domain::Region;

/// Provider of realised prices and forecast runs for a region.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Realised prices aligned to the dispatch timeline `[start, end)`
    async fn realised_prices(
        &self,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<PriceSeries>;

    /// Forecast runs that may cover any interval in `[start, end)`
    async fn forecast_runs(
        &self,
        product: ForecastProduct,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<ForecastRuns>;

    /// Identifies the data behind this source in cache keys
    fn cache_namespace(&self) -> String;
}

type TableCell = Arc<OnceCell<Arc<AemoTable>>>;

/// Reads AEMO tables from CSV files laid out as `root/<TABLE>/*.csv`.
///
/// Each table is parsed once and shared by every region and window asked
/// for afterwards; clones share the parsed tables.
#[derive(Debug, Clone)]
pub struct CsvMarketData {
    root: PathBuf,
    tables: Arc<Mutex<HashMap<&'static str, TableCell>>>,
}

impl CsvMarketData {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tables: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn table(&self, table: &'static str) -> Result<Arc<AemoTable>> {
        let cell = {
            let mut tables = self.tables.lock().await;
            Arc::clone(tables.entry(table).or_default())
        };
        let parsed = cell
            .get_or_try_init(|| async { self.read_table(table).await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(parsed))
    }

    async fn read_table(&self, table: &'static str) -> Result<AemoTable> {
        let dir = self.root.join(table);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| DataError::Io {
                path: dir.clone(),
                source,
            })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| DataError::Io {
            path: dir.clone(),
            source,
        })? {
            let path = entry.path();
            let is_csv = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if is_csv {
                files.push(path);
            }
        }
        files.sort();

        let mut merged = AemoTable::default();
        for path in &files {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| DataError::Io {
                    path: path.clone(),
                    source,
                })?;
            let parsed = AemoTable::from_bytes(&bytes)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            merged.extend(parsed);
        }

        tracing::debug!(
            table,
            files = files.len(),
            rows = merged.row_count(),
            "loaded AEMO table"
        );
        Ok(merged)
    }
}

#[async_trait]
impl MarketDataSource for CsvMarketData {
    async fn realised_prices(
        &self,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<PriceSeries> {
        let table = self.table(DISPATCHPRICE).await?;
        let records = parse_dispatch_prices(&table, region)?;
        if !records.iter().any(|r| r.timestamp >= start && r.timestamp < end) {
            return Err(DataError::NoData {
                table: DISPATCHPRICE,
                region: region.to_string(),
                start,
                end,
            }
            .into());
        }
        Ok(PriceSeries::align(&records, start, end))
    }

    async fn forecast_runs(
        &self,
        product: ForecastProduct,
        region: Region,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<ForecastRuns> {
        let table = self.table(product.table()).await?;
        let records = parse_forecast_records(&table, product, region)?;
        let mut runs = ForecastRuns::from_records(product, records);
        runs.retain_runs(start - product.lookback(), end);
        if runs.is_empty() {
            return Err(DataError::NoData {
                table: product.table(),
                region: region.to_string(),
                start,
                end,
            }
            .into());
        }
        tracing::info!(%product, %region, runs = runs.run_count(), "loaded forecast runs");
        Ok(runs)
    }

    fn cache_namespace(&self) -> String {
        format!("csv:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_market_timestamp;

    fn ts(s: &str) -> NaiveDateTime {
        parse_market_timestamp(s).unwrap()
    }

    #[tokio::test]
    async fn test_reads_every_csv_in_table_dir() {
        let dir = tempfile::tempdir().unwrap();
        let prices = dir.path().join(DISPATCHPRICE);
        std::fs::create_dir_all(&prices).unwrap();
        std::fs::write(
            prices.join("a.csv"),
            "SETTLEMENTDATE,REGIONID,RRP\n2023/01/01 00:05:00,TAS1,20\n",
        )
        .unwrap();
        std::fs::write(
            prices.join("b.CSV"),
            "SETTLEMENTDATE,REGIONID,RRP\n2023/01/01 00:10:00,TAS1,30\n",
        )
        .unwrap();
        std::fs::write(prices.join("notes.txt"), "ignored").unwrap();

        let source = CsvMarketData::new(dir.path());
        let series = source
            .realised_prices(Region::TAS1, ts("2023-01-01 00:00"), ts("2023-01-01 00:10"))
            .await
            .unwrap();
        assert_eq!(series.energy, vec![20.0, 30.0]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvMarketData::new(dir.path());
        let err = source
            .forecast_runs(
                ForecastProduct::P5Min,
                Region::NSW1,
                ts("2023-01-01 00:00"),
                ts("2023-01-02 00:00"),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("P5MIN_REGIONSOLUTION"));
    }

    #[tokio::test]
    async fn test_tables_are_parsed_once() {
        let dir = tempfile::tempdir().unwrap();
        let prices = dir.path().join(DISPATCHPRICE);
        std::fs::create_dir_all(&prices).unwrap();
        std::fs::write(
            prices.join("2023-01.csv"),
            "SETTLEMENTDATE,REGIONID,RRP\n\
             2023/01/01 00:05:00,SA1,20\n\
             2023/01/01 00:05:00,VIC1,40\n",
        )
        .unwrap();

        let source = CsvMarketData::new(dir.path());
        let (start, end) = (ts("2023-01-01 00:00"), ts("2023-01-01 00:05"));
        let sa = source.realised_prices(Region::SA1, start, end).await.unwrap();

        // Later regions are served from the parsed table, not the files
        std::fs::remove_dir_all(&prices).unwrap();
        let vic = source.clone().realised_prices(Region::VIC1, start, end).await.unwrap();
        assert_eq!(sa.energy, vec![20.0]);
        assert_eq!(vic.energy, vec![40.0]);
    }

    #[tokio::test]
    async fn test_failed_read_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvMarketData::new(dir.path());
        let (start, end) = (ts("2023-01-01 00:00"), ts("2023-01-01 00:05"));
        assert!(source.realised_prices(Region::SA1, start, end).await.is_err());

        let prices = dir.path().join(DISPATCHPRICE);
        std::fs::create_dir_all(&prices).unwrap();
        std::fs::write(
            prices.join("2023-01.csv"),
            "SETTLEMENTDATE,REGIONID,RRP\n2023/01/01 00:05:00,SA1,20\n",
        )
        .unwrap();
        let series = source.realised_prices(Region::SA1, start, end).await.unwrap();
        assert_eq!(series.energy, vec![20.0]);
    }
}
