use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::models::{record_id, Scope};

/// Prediction backend that produced a forecast.
///
/// Downstream consumers (scoring, surges, staffing) never branch on the method;
/// it is carried so accuracy can be compared per backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ForecastMethod {
    SeasonalMovingAverage,
    ExponentialSmoothing,
    HoltWinters,
    /// Any plugged-in backend, identified by its own tag
    External(String),
}

impl ForecastMethod {
    pub fn as_str(&self) -> &str {
        match self {
            ForecastMethod::SeasonalMovingAverage => "seasonal_moving_average",
            ForecastMethod::ExponentialSmoothing => "exponential_smoothing",
            ForecastMethod::HoltWinters => "holt_winters",
            ForecastMethod::External(tag) => tag,
        }
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForecastMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("forecast method tag must not be empty".to_string()),
            "seasonal_moving_average" => Ok(ForecastMethod::SeasonalMovingAverage),
            "exponential_smoothing" => Ok(ForecastMethod::ExponentialSmoothing),
            "holt_winters" => Ok(ForecastMethod::HoltWinters),
            other => Ok(ForecastMethod::External(other.to_string())),
        }
    }
}

impl From<ForecastMethod> for String {
    fn from(method: ForecastMethod) -> Self {
        method.as_str().to_string()
    }
}

impl TryFrom<String> for ForecastMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Direction of recent demand, from the slope of the latest observations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastStatus {
    /// No actual recorded yet
    Pending,
    /// Actual recorded and accuracy computed; immutable from here on
    Scored,
}

/// Identity of a forecast within its scope; unique among live records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForecastKey {
    pub scope: Scope,
    pub forecast_date: NaiveDate,
    pub horizon_days: u32,
}

/// One predicted day: point estimate plus interval, before it becomes a stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub forecast_date: NaiveDate,
    /// Days between the last observation and `forecast_date` (1-based)
    pub lead_days: u32,
    pub predicted_demand: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub confidence_score: f64,
}

/// A stored demand forecast for one scope and day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub id: Uuid,
    pub scope: Scope,
    pub forecast_date: NaiveDate,
    /// Horizon of the generation run that produced this record
    pub horizon_days: u32,
    pub lead_days: u32,
    pub method: ForecastMethod,
    pub predicted_demand: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub confidence_score: f64,
    pub trend: TrendDirection,
    /// Set when the forecast was produced from fewer than the minimum history
    pub insufficient_history: bool,
    pub generated_at: DateTime<Utc>,
    pub observed_actual: Option<f64>,
    pub accuracy_score: Option<f64>,
    pub scored_at: Option<DateTime<Utc>>,
}

impl Forecast {
    /// Builds a pending record; the id is derived from the key and generation time.
    pub fn pending(
        scope: Scope,
        point: ForecastPoint,
        horizon_days: u32,
        method: ForecastMethod,
        trend: TrendDirection,
        insufficient_history: bool,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let id = record_id(&format!(
            "forecast:{}:{}:{}:{}",
            scope.key(),
            point.forecast_date,
            horizon_days,
            generated_at.to_rfc3339()
        ));
        Self {
            id,
            scope,
            forecast_date: point.forecast_date,
            horizon_days,
            lead_days: point.lead_days,
            method,
            predicted_demand: point.predicted_demand,
            confidence_lower: point.confidence_lower,
            confidence_upper: point.confidence_upper,
            confidence_score: point.confidence_score,
            trend,
            insufficient_history,
            generated_at,
            observed_actual: None,
            accuracy_score: None,
            scored_at: None,
        }
    }

    pub fn key(&self) -> ForecastKey {
        ForecastKey {
            scope: self.scope.clone(),
            forecast_date: self.forecast_date,
            horizon_days: self.horizon_days,
        }
    }

    pub fn status(&self) -> ForecastStatus {
        if self.accuracy_score.is_some() {
            ForecastStatus::Scored
        } else {
            ForecastStatus::Pending
        }
    }

    pub fn is_scored(&self) -> bool {
        self.status() == ForecastStatus::Scored
    }

    /// Absolute error against the recorded actual, if any.
    pub fn absolute_error(&self) -> Option<f64> {
        self.observed_actual
            .map(|actual| (actual - self.predicted_demand).abs())
    }
}
