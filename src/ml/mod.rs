/*!
 * # Analytical Components
 *
 * Pure, synchronous components over in-memory series. None of them performs
 * I/O or keeps state between calls, so they can run in parallel across scopes.
 */

/// Shared numeric helpers
pub mod statistics;

/// Weekday and month multipliers
pub mod seasonality;

/// N-day-ahead demand prediction
pub mod forecasting;

/// Forecast scoring and aggregate accuracy
pub mod accuracy;

/// Statistical, seasonal and trend anomaly detectors, plus single-value scoring
pub mod anomaly_detection;

/// Sustained above-baseline runs in a forecast
pub mod surge;

/// Demand to headcount translation
pub mod staffing;

pub use accuracy::AccuracyScorer;
pub use anomaly_detection::AnomalyDetector;
pub use forecasting::{
    DemandModel, DemandPredictor, ExponentialSmoothing, HoltWinters, SeasonalMovingAverage,
};
pub use seasonality::SeasonalPatternDetector;
pub use staffing::{DirectCapacity, StaffingCalculator, StaffingStrategy};
pub use surge::SurgeIdentifier;
