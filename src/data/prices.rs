//! Realised regional reference prices (`DISPATCHPRICE`).
//!
//! AEMO marks settlement against the *end* of an interval, so a price
//! recorded at 00:05 covers 00:00-00:05. Records here are re-labelled by
//! interval start.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

use super::aemo::{parse_number, AemoTable};
use super::{is_intervention, DataError, LoadStats};
use crate::domain::{
    parse_market_timestamp, timeline, FcasMarket, FcasValues, Region, DISPATCH_INTERVAL_MINUTES,
    FCAS_MARKETS,
};

pub const DISPATCHPRICE: &str = "DISPATCHPRICE";

const SETTLEMENTDATE: &[&str] = &["SETTLEMENTDATE"];
pub(crate) const REGIONID: &[&str] = &["REGIONID"];
pub(crate) const RRP: &[&str] = &["RRP"];
pub(crate) const INTERVENTION: &[&str] = &["INTERVENTION"];

/// Energy price plus FCAS prices when the source carries them ($/MWh)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    pub rrp: f64,
    pub fcas: Option<FcasValues>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRecord {
    /// Interval start
    pub timestamp: NaiveDateTime,
    pub price: MarketPrice,
}

/// FCAS columns in [`FcasMarket`] order
pub(crate) fn fcas_columns() -> Vec<&'static [&'static str]> {
    FcasMarket::iter()
        .map(|m| -> &'static [&'static str] {
            match m {
                FcasMarket::Raise6Sec => &["RAISE6SECRRP"],
                FcasMarket::Raise60Sec => &["RAISE60SECRRP"],
                FcasMarket::Raise5Min => &["RAISE5MINRRP"],
                FcasMarket::Lower6Sec => &["LOWER6SECRRP"],
                FcasMarket::Lower60Sec => &["LOWER60SECRRP"],
                FcasMarket::Lower5Min => &["LOWER5MINRRP"],
            }
        })
        .collect()
}

/// All six FCAS prices, or `None` if any is absent
pub(crate) fn parse_fcas(fields: &[Option<&str>]) -> Option<FcasValues> {
    let mut out = [0.0; FCAS_MARKETS];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field.and_then(parse_number)?;
    }
    (fields.len() == FCAS_MARKETS).then_some(out)
}

/// Parse `DISPATCHPRICE` rows for `region`, dropping intervention runs.
pub fn parse_dispatch_prices(
    table: &AemoTable,
    region: Region,
) -> Result<Vec<PriceRecord>, DataError> {
    let mut columns: Vec<&[&str]> = vec![SETTLEMENTDATE, REGIONID, RRP, INTERVENTION];
    columns.extend(fcas_columns());

    let rows = table.select(DISPATCHPRICE, &columns, 3)?;
    let shift = Duration::minutes(DISPATCH_INTERVAL_MINUTES);
    let mut stats = LoadStats::default();
    let mut out = Vec::new();

    for row in rows {
        if row[1] != Some(region.as_str()) {
            continue;
        }
        stats.rows += 1;
        if is_intervention(row[3]) {
            stats.interventions += 1;
            continue;
        }
        let (Some(settlement), Some(rrp)) = (
            row[0].and_then(parse_market_timestamp),
            row[2].and_then(parse_number),
        ) else {
            stats.malformed += 1;
            continue;
        };
        stats.kept += 1;
        out.push(PriceRecord {
            timestamp: settlement - shift,
            price: MarketPrice {
                rrp,
                fcas: parse_fcas(&row[4..]),
            },
        });
    }

    stats.report(DISPATCHPRICE);
    Ok(out)
}

/// Prices aligned to the dispatch timeline `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub timestamps: Vec<NaiveDateTime>,
    /// Energy price per interval; `NaN` where no price was published
    pub energy: Vec<f64>,
    /// FCAS prices per interval, when every record carried them
    pub fcas: Option<Vec<FcasValues>>,
}

impl PriceSeries {
    pub fn align(records: &[PriceRecord], start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let by_time: BTreeMap<NaiveDateTime, MarketPrice> = records
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp < end)
            .map(|r| (r.timestamp, r.price))
            .collect();

        let timestamps = timeline(start, end);
        let energy: Vec<f64> = timestamps
            .iter()
            .map(|ts| by_time.get(ts).map(|p| p.rrp).unwrap_or(f64::NAN))
            .collect();

        let has_fcas = !by_time.is_empty() && by_time.values().all(|p| p.fcas.is_some());
        let fcas = has_fcas.then(|| {
            timestamps
                .iter()
                .map(|ts| {
                    by_time
                        .get(ts)
                        .and_then(|p| p.fcas)
                        .unwrap_or([f64::NAN; FCAS_MARKETS])
                })
                .collect()
        });

        let series = Self {
            timestamps,
            energy,
            fcas,
        };
        let missing = series.missing_count();
        if missing > 0 {
            tracing::warn!(missing, total = series.len(), "realised prices missing for some intervals");
        }
        series
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.energy.iter().filter(|p| p.is_nan()).count()
    }

    pub fn fcas_at(&self, index: usize) -> Option<&FcasValues> {
        self.fcas.as_ref().and_then(|f| f.get(index))
    }
}
