use uuid::Uuid;

// Scope and input series
pub mod observation;
pub mod scope;

// Engine outputs
pub mod accuracy;
pub mod anomaly;
pub mod forecast;
pub mod seasonal_pattern;
pub mod staffing;
pub mod surge;

pub use accuracy::AccuracyMetric;
pub use anomaly::{
    AnomalyFinding, AnomalyMethod, AnomalyReport, RealtimeAssessment, Sensitivity, Severity,
    SkippedDetector,
};
pub use forecast::{
    Forecast, ForecastKey, ForecastMethod, ForecastPoint, ForecastStatus, TrendDirection,
};
pub use observation::{DemandSeries, Observation};
pub use scope::Scope;
pub use seasonal_pattern::{PatternType, SeasonalPattern, SeasonalSnapshot};
pub use staffing::StaffingPlan;
pub use surge::SurgePeriod;

/// Namespace for record ids derived from natural keys.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a8e_53b4_4d0f_9a61_d2c7_e0b3_4f15);

/// Deterministic record id for a natural key.
pub(crate) fn record_id(natural_key: &str) -> Uuid {
    Uuid::new_v5(&RECORD_NAMESPACE, natural_key.as_bytes())
}
