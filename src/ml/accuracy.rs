/*!
 * # Forecast Accuracy
 *
 * Per-forecast scoring against observed actuals, and aggregate MAE / MAPE /
 * RMSE / within-tolerance rate over a period. A forecast is scored exactly once.
 */

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::AccuracyConfig;
use crate::errors::ServiceError;
use crate::models::{AccuracyMetric, Forecast, Scope};

/// `|actual - predicted| / max(actual, 1)`
pub fn relative_error(actual: f64, predicted: f64) -> f64 {
    (actual - predicted).abs() / actual.max(1.0)
}

/// `max(0, 1 - relative_error)`
pub fn accuracy_score(actual: f64, predicted: f64) -> f64 {
    (1.0 - relative_error(actual, predicted)).max(0.0)
}

#[derive(Debug, Clone, Default)]
pub struct AccuracyScorer {
    config: AccuracyConfig,
}

impl AccuracyScorer {
    pub fn new(config: AccuracyConfig) -> Self {
        Self { config }
    }

    pub fn tolerance(&self) -> f64 {
        self.config.tolerance
    }

    /// Records the actual and moves the forecast to scored.
    ///
    /// A forecast that already carries a score is left untouched and
    /// `ForecastImmutable` is returned.
    pub fn score(
        &self,
        forecast: &mut Forecast,
        actual: f64,
        scored_at: DateTime<Utc>,
    ) -> Result<f64, ServiceError> {
        if forecast.is_scored() {
            return Err(ServiceError::ForecastImmutable {
                scope: forecast.scope.key(),
                forecast_date: forecast.forecast_date,
                horizon_days: forecast.horizon_days,
            });
        }
        if !actual.is_finite() || actual < 0.0 {
            return Err(ServiceError::InvalidInput(format!(
                "actual demand for {} must be a finite non-negative number, got {}",
                forecast.forecast_date, actual
            )));
        }

        let score = accuracy_score(actual, forecast.predicted_demand);
        forecast.observed_actual = Some(actual);
        forecast.accuracy_score = Some(score);
        forecast.scored_at = Some(scored_at);
        Ok(score)
    }

    /// Aggregates the scored forecasts of `scope` dated within `[start, end]`.
    ///
    /// Unscored and out-of-scope records are ignored. MAPE averages only the
    /// forecasts whose actual is positive; the others still count towards MAE,
    /// RMSE and the tolerance rate.
    pub fn aggregate<'a>(
        &self,
        scope: &Scope,
        period_start: NaiveDate,
        period_end: NaiveDate,
        forecasts: impl IntoIterator<Item = &'a Forecast>,
    ) -> AccuracyMetric {
        let pairs: Vec<(f64, f64)> = forecasts
            .into_iter()
            .filter(|f| {
                &f.scope == scope && f.forecast_date >= period_start && f.forecast_date <= period_end
            })
            .filter_map(|f| match (f.observed_actual, f.accuracy_score) {
                (Some(actual), Some(_)) => Some((actual, f.predicted_demand)),
                _ => None,
            })
            .collect();

        let mut metric =
            AccuracyMetric::empty(scope.clone(), period_start, period_end, self.config.tolerance);
        if pairs.is_empty() {
            return metric;
        }

        let n = pairs.len() as f64;
        let abs_errors: Vec<f64> = pairs.iter().map(|(a, p)| (a - p).abs()).collect();
        let percentage_errors: Vec<f64> = pairs
            .iter()
            .filter(|(a, _)| *a > 0.0)
            .map(|(a, p)| (a - p).abs() / a)
            .collect();
        let within = pairs
            .iter()
            .filter(|(a, p)| relative_error(*a, *p) <= self.config.tolerance)
            .count();

        metric.sample_size = pairs.len();
        metric.mae = Some(abs_errors.iter().sum::<f64>() / n);
        metric.rmse = Some((abs_errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt());
        metric.mape_sample_size = percentage_errors.len();
        metric.mape = if percentage_errors.is_empty() {
            None
        } else {
            Some(percentage_errors.iter().sum::<f64>() / percentage_errors.len() as f64)
        };
        metric.accuracy_rate_within_tolerance = Some(within as f64 / n);
        metric
    }
}
