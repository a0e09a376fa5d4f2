use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

// ============================================================================
// Dispatch Timeline
// ============================================================================

/// Length of a NEM dispatch interval in minutes
pub const DISPATCH_INTERVAL_MINUTES: i64 = 5;

/// Length of a NEM dispatch interval in hours
pub const DISPATCH_INTERVAL_HOURS: f64 = DISPATCH_INTERVAL_MINUTES as f64 / 60.0;

/// Dispatch intervals in one day
pub const INTERVALS_PER_DAY: usize = (24 * 60 / DISPATCH_INTERVAL_MINUTES) as usize;

pub fn dispatch_interval() -> Duration {
    Duration::minutes(DISPATCH_INTERVAL_MINUTES)
}

/// Hour of market time at which a NEM trading day begins
pub const TRADING_DAY_START_HOUR: i64 = 4;

/// Trading day an interval belongs to. The interval starting at 04:00 opens
/// a new trading day; intervals before it belong to the previous one.
pub fn trading_date(interval_start: NaiveDateTime) -> NaiveDate {
    (interval_start - Duration::hours(TRADING_DAY_START_HOUR)).date()
}

/// All interval-start timestamps in `[start, end)` at dispatch resolution.
pub fn timeline(start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
    let step = dispatch_interval();
    let mut out = Vec::new();
    let mut ts = start;
    while ts < end {
        out.push(ts);
        ts += step;
    }
    out
}

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse an AEMO market timestamp. AEMO publishes naive market time (AEST).
pub fn parse_market_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim().trim_matches('"');
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ============================================================================
// Market Regions
// ============================================================================

/// NEM pricing region, displayed as its AEMO `REGIONID`
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter)]
pub enum Region {
    #[serde(rename = "NSW1")]
    NSW1,
    #[serde(rename = "QLD1")]
    QLD1,
    #[serde(rename = "SA1")]
    SA1,
    #[serde(rename = "TAS1")]
    TAS1,
    #[serde(rename = "VIC1")]
    VIC1,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NSW1 => "NSW1",
            Self::QLD1 => "QLD1",
            Self::SA1 => "SA1",
            Self::TAS1 => "TAS1",
            Self::VIC1 => "VIC1",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Region {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Region::iter()
            .find(|r| r.as_str() == upper || r.as_str().trim_end_matches('1') == upper)
            .ok_or_else(|| format!("invalid region '{s}'; expected one of NSW1, QLD1, SA1, TAS1, VIC1"))
    }
}

// ============================================================================
// FCAS Markets
// ============================================================================

/// Number of contingency FCAS markets
pub const FCAS_MARKETS: usize = 6;

/// Contingency FCAS markets in action-vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FcasMarket {
    Raise6Sec,
    Raise60Sec,
    Raise5Min,
    Lower6Sec,
    Lower60Sec,
    Lower5Min,
}

impl FcasMarket {
    /// Probability that a market is called on in any dispatch interval
    pub const EVENT_PROBABILITY: f64 = 0.05;

    pub fn index(&self) -> usize {
        match self {
            Self::Raise6Sec => 0,
            Self::Raise60Sec => 1,
            Self::Raise5Min => 2,
            Self::Lower6Sec => 3,
            Self::Lower60Sec => 4,
            Self::Lower5Min => 5,
        }
    }

    /// Raise services discharge, lower services charge
    pub fn is_raise(&self) -> bool {
        matches!(self, Self::Raise6Sec | Self::Raise60Sec | Self::Raise5Min)
    }

    /// Duration of a full response, in hours
    pub fn response_hours(&self) -> f64 {
        match self {
            Self::Raise6Sec | Self::Lower6Sec => 6.0 / 3600.0,
            Self::Raise60Sec | Self::Lower60Sec => 60.0 / 3600.0,
            Self::Raise5Min | Self::Lower5Min => DISPATCH_INTERVAL_HOURS,
        }
    }

    /// Expected energy (MWh) moved per MW enabled over one interval
    pub fn expected_hours(&self) -> f64 {
        Self::EVENT_PROBABILITY * self.response_hours()
    }

    /// Price column in AEMO price tables
    pub fn price_column(&self) -> &'static str {
        match self {
            Self::Raise6Sec => "RAISE6SECRRP",
            Self::Raise60Sec => "RAISE60SECRRP",
            Self::Raise5Min => "RAISE5MINRRP",
            Self::Lower6Sec => "LOWER6SECRRP",
            Self::Lower60Sec => "LOWER60SECRRP",
            Self::Lower5Min => "LOWER5MINRRP",
        }
    }
}

impl std::fmt::Display for FcasMarket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.price_column().trim_end_matches("RRP");
        write!(f, "{s}")
    }
}

/// Prices (or allocations) for each FCAS market, indexed by [`FcasMarket::index`]
pub type FcasValues = [f64; FCAS_MARKETS];

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_region_parsing() {
        assert_eq!(Region::from_str("QLD1").unwrap(), Region::QLD1);
        assert_eq!(Region::from_str("nsw1").unwrap(), Region::NSW1);
        assert_eq!(Region::from_str("sa").unwrap(), Region::SA1);
        assert!(Region::from_str("WA1").is_err());
        assert_eq!(Region::VIC1.to_string(), "VIC1");
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 5, 0)
            .unwrap();
        assert_eq!(parse_market_timestamp("2023/01/01 00:05:00"), Some(expected));
        assert_eq!(parse_market_timestamp("\"2023-01-01 00:05:00\""), Some(expected));
        assert_eq!(parse_market_timestamp("2023-01-01T00:05"), Some(expected));
        assert_eq!(parse_market_timestamp("yesterday"), None);
    }

    #[test]
    fn test_timeline_is_half_open() {
        let start = parse_market_timestamp("2023-01-01 00:00").unwrap();
        let end = parse_market_timestamp("2023-01-01 01:00").unwrap();
        let ts = timeline(start, end);
        assert_eq!(ts.len(), 12);
        assert_eq!(ts[0], start);
        assert_eq!(*ts.last().unwrap(), end - dispatch_interval());
    }

    #[test]
    fn test_trading_day_rolls_over_at_four() {
        let date = |d| NaiveDate::from_ymd_opt(2023, 1, d).unwrap();
        let at = |s: &str| parse_market_timestamp(s).unwrap();
        assert_eq!(trading_date(at("2023-01-02 00:00")), date(1));
        assert_eq!(trading_date(at("2023-01-02 03:55")), date(1));
        assert_eq!(trading_date(at("2023-01-02 04:00")), date(2));
        assert_eq!(trading_date(at("2023-01-02 23:55")), date(2));
    }

    #[test]
    fn test_fcas_market_order() {
        let markets: Vec<_> = FcasMarket::iter().collect();
        assert_eq!(markets.len(), FCAS_MARKETS);
        for (i, m) in markets.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
        assert!(FcasMarket::Raise60Sec.is_raise());
        assert!(!FcasMarket::Lower5Min.is_raise());
        assert_eq!(FcasMarket::Lower6Sec.to_string(), "LOWER6SEC");
    }
}
