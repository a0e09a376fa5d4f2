use std::io;

use super::result_labels;
use crate::backtest::{BacktestInputData, BacktestResults};
use crate::forecast::ForecastTable;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Write realised prices and each run's trajectory as one CSV row per interval.
///
/// Columns are `timestamp,price` followed by `action`, `soc`, `max_capacity`,
/// `revenue` and `cumulative_revenue` for every result, suffixed with the
/// result label.
pub fn export_timeseries<W: io::Write>(
    data: &BacktestInputData,
    results: &[&BacktestResults],
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    let labels = result_labels(results.iter().copied());

    let mut header = vec!["timestamp".to_string(), "price".to_string()];
    for label in &labels {
        for column in ["action", "soc", "max_capacity", "revenue", "cumulative_revenue"] {
            header.push(format!("{column} [{label}]"));
        }
    }
    wtr.write_record(&header)?;

    let cumulative: Vec<Vec<f64>> = results.iter().map(|r| r.cumulative_revenue()).collect();
    for (t, ts) in data.timestamps.iter().enumerate() {
        let mut record = vec![
            ts.format(TIMESTAMP_FORMAT).to_string(),
            cell(data.prices.energy[t]),
        ];
        for (r, cum) in results.iter().zip(&cumulative) {
            let value = |v: &[f64]| v.get(t).copied().map(cell).unwrap_or_default();
            record.push(value(&r.p_actions));
            record.push(value(&r.c_soc));
            record.push(value(&r.c_max));
            record.push(value(&r.revenue));
            record.push(value(cum));
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write a merged forecast as CSV: `timestamp` then one column per step.
///
/// Short rows leave their trailing cells empty.
pub fn export_forecast<W: io::Write>(table: &ForecastTable, writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    let steps = table.max_steps();

    let mut header = vec!["timestamp".to_string()];
    header.extend((0..steps).map(|k| format!("step_{k}")));
    wtr.write_record(&header)?;

    for (ts, row) in table.timestamps.iter().zip(&table.rows) {
        let mut record = Vec::with_capacity(steps + 1);
        record.push(ts.format(TIMESTAMP_FORMAT).to_string());
        record.extend((0..steps).map(|k| row.energy.get(k).copied().map(cell).unwrap_or_default()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{run_backtest, BacktestOptions};
    use crate::data::PriceSeries;
    use crate::domain::{parse_market_timestamp, timeline, BatterySpec, Region};
    use crate::forecast::{perfect_forecast, ForecastRow};
    use crate::strategies::{BaselineParams, ForecastBaseline};

    fn data() -> BacktestInputData {
        let start = parse_market_timestamp("2023-01-01 00:00").unwrap();
        let end = parse_market_timestamp("2023-01-01 00:20").unwrap();
        let prices = PriceSeries {
            timestamps: timeline(start, end),
            energy: vec![10.0, f64::NAN, 200.0, 30.0],
            fcas: None,
        };
        let forecast = perfect_forecast(Region::QLD1, &prices, 3);
        BacktestInputData::new(Region::QLD1, start, end, prices, forecast).unwrap()
    }

    #[test]
    fn test_timeseries_layout() {
        let data = data();
        let strategy = ForecastBaseline::new(BaselineParams::default()).unwrap();
        let run = run_backtest(&data, &BatterySpec::default(), &strategy, &BacktestOptions::default()).unwrap();

        let mut out = Vec::new();
        export_timeseries(&data, &[&run, &run], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("timestamp,price,action [ForecastBaseline],"));
        assert!(lines[0].contains("cumulative_revenue [ForecastBaseline (2)]"));
        assert_eq!(lines[0].split(',').count(), 12);
        assert!(lines[1].starts_with("2023-01-01 00:00:00,10,"));
        // Missing price is an empty cell
        assert!(lines[2].starts_with("2023-01-01 00:05:00,,"));
    }

    #[test]
    fn test_forecast_layout() {
        let data = data();
        let mut out = Vec::new();
        export_forecast(&data.forecast, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        // Widest row has two steps: the third is cut at the end of the data
        assert_eq!(lines[0], "timestamp,step_0,step_1");
        assert_eq!(lines[1], "2023-01-01 00:00:00,10,");
        assert_eq!(lines[2], "2023-01-01 00:05:00,,");
        assert_eq!(lines[3], "2023-01-01 00:10:00,200,30");
        assert_eq!(lines[4], "2023-01-01 00:15:00,30,");
    }

    #[test]
    fn test_empty_forecast_table() {
        let table = ForecastTable {
            region: Region::TAS1,
            timestamps: vec![],
            rows: Vec::<ForecastRow>::new(),
        };
        let mut out = Vec::new();
        export_forecast(&table, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "timestamp\n");
    }
}
