use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::Scope;

/// Aggregate accuracy of the scored forecasts of one scope over a period.
///
/// Metric fields are `None` when there is nothing to average, never NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetric {
    pub scope: Scope,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub sample_size: usize,
    pub mae: Option<f64>,
    /// Averaged only over forecasts whose actual was positive
    pub mape: Option<f64>,
    pub mape_sample_size: usize,
    pub rmse: Option<f64>,
    pub accuracy_rate_within_tolerance: Option<f64>,
    pub tolerance: f64,
}

impl AccuracyMetric {
    pub fn empty(scope: Scope, period_start: NaiveDate, period_end: NaiveDate, tolerance: f64) -> Self {
        Self {
            scope,
            period_start,
            period_end,
            sample_size: 0,
            mae: None,
            mape: None,
            mape_sample_size: 0,
            rmse: None,
            accuracy_rate_within_tolerance: None,
            tolerance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sample_size == 0
    }
}
