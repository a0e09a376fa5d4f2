//! Forecast Metrics and Evaluation
//!
//! Accuracy of price forecasts against realised prices: MAE, RMSE, MAPE and
//! R², overall and per lead time.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ForecastRow;

/// Forecast accuracy metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (%)
    pub mape: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
    /// Number of samples evaluated
    pub sample_count: usize,
    /// Maximum absolute error observed
    pub max_error: f64,
    /// Minimum absolute error observed
    pub min_error: f64,
    /// Standard deviation of errors
    pub std_dev: f64,
}

impl ForecastMetrics {
    /// Calculate metrics from actual and predicted values
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, ForecastMetricsError> {
        if actual.len() != predicted.len() {
            return Err(ForecastMetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }

        if actual.is_empty() {
            return Err(ForecastMetricsError::EmptyData);
        }

        let n = actual.len();
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n as f64;
        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let rmse = (sse / n as f64).sqrt();

        // Percentage error is undefined for zero prices
        let percentage_errors: Vec<f64> = actual
            .iter()
            .zip(&errors)
            .filter(|(a, _)| a.abs() > 1e-6)
            .map(|(a, e)| e.abs() / a.abs() * 100.0)
            .collect();
        let mape = if percentage_errors.is_empty() {
            0.0
        } else {
            percentage_errors.iter().sum::<f64>() / percentage_errors.len() as f64
        };

        let mean_actual = actual.iter().sum::<f64>() / n as f64;
        let total_variance: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
        let r2 = if total_variance > 1e-10 {
            1.0 - sse / total_variance
        } else {
            0.0
        };

        let max_error = errors.iter().map(|e| e.abs()).fold(0.0f64, f64::max);
        let min_error = errors.iter().map(|e| e.abs()).fold(f64::INFINITY, f64::min);

        let mean_error = errors.iter().sum::<f64>() / n as f64;
        let variance = errors.iter().map(|e| (e - mean_error).powi(2)).sum::<f64>() / n as f64;

        Ok(ForecastMetrics {
            mae,
            rmse,
            mape,
            r2,
            sample_count: n,
            max_error,
            min_error,
            std_dev: variance.sqrt(),
        })
    }

    /// Assess forecast quality based on MAPE
    pub fn quality(&self) -> ForecastQuality {
        if self.mape < 5.0 {
            ForecastQuality::Excellent
        } else if self.mape < 10.0 {
            ForecastQuality::Good
        } else if self.mape < 20.0 {
            ForecastQuality::Fair
        } else if self.mape < 50.0 {
            ForecastQuality::Poor
        } else {
            ForecastQuality::VeryPoor
        }
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE={:.2}, RMSE={:.2}, MAPE={:.1}%, R²={:.3}, n={}, Quality={:?}",
            self.mae,
            self.rmse,
            self.mape,
            self.r2,
            self.sample_count,
            self.quality()
        )
    }
}

/// Forecast quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastQuality {
    Excellent,  // MAPE < 5%
    Good,       // MAPE 5-10%
    Fair,       // MAPE 10-20%
    Poor,       // MAPE 20-50%
    VeryPoor,   // MAPE > 50%
}

/// Forecast metrics calculation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForecastMetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,
}

/// Accuracy of forecasts made `lead` intervals ahead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadTimeAccuracy {
    pub lead: usize,
    pub lead_minutes: i64,
    pub metrics: ForecastMetrics,
}

/// Compare step `lead` of every forecast row with the realised price of the
/// interval it forecasts. Leads without any comparable sample are skipped.
pub fn lead_time_accuracy(rows: &[ForecastRow], realised: &[f64], leads: &[usize]) -> Vec<LeadTimeAccuracy> {
    leads
        .iter()
        .filter_map(|&lead| {
            let (actual, predicted): (Vec<f64>, Vec<f64>) = rows
                .iter()
                .enumerate()
                .filter_map(|(i, row)| {
                    let p = *row.energy.get(lead)?;
                    let a = *realised.get(i + lead)?;
                    (!a.is_nan() && !p.is_nan()).then_some((a, p))
                })
                .unzip();
            let metrics = ForecastMetrics::calculate(&actual, &predicted).ok()?;
            Some(LeadTimeAccuracy {
                lead,
                lead_minutes: lead as i64 * crate::domain::DISPATCH_INTERVAL_MINUTES,
                metrics,
            })
        })
        .collect()
}
