/*!
 * # Metrics Module
 *
 * Prometheus counters for the forecasting engine. The counters live in the
 * process-wide default registry once [`register_metrics`] has been called;
 * a host application exposes them through whatever endpoint it runs.
 */

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};

use crate::errors::ServiceError;

lazy_static! {
    pub static ref FORECAST_RUNS: IntCounter = IntCounter::new(
        "demand_forecast_runs_total",
        "Total number of forecast generation runs"
    )
    .expect("metric can be created");
    pub static ref FORECAST_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "demand_forecast_failures_total",
            "Total number of failed forecast generation runs"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    pub static ref FORECASTS_WRITTEN: IntCounter = IntCounter::new(
        "demand_forecasts_written_total",
        "Total number of forecast records written"
    )
    .expect("metric can be created");
    pub static ref FORECASTS_SCORED: IntCounter = IntCounter::new(
        "demand_forecasts_scored_total",
        "Total number of forecasts scored against observed demand"
    )
    .expect("metric can be created");
    pub static ref PATTERN_REFRESHES: IntCounter = IntCounter::new(
        "demand_pattern_refreshes_total",
        "Total number of seasonal pattern recomputations"
    )
    .expect("metric can be created");
    pub static ref ANOMALIES_DETECTED: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "demand_anomalies_detected_total",
            "Total number of anomalies detected"
        ),
        &["method", "severity"]
    )
    .expect("metric can be created");
}

/// Registers every engine counter with `registry`.
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(FORECAST_RUNS.clone()))?;
    registry.register(Box::new(FORECAST_FAILURES.clone()))?;
    registry.register(Box::new(FORECASTS_WRITTEN.clone()))?;
    registry.register(Box::new(FORECASTS_SCORED.clone()))?;
    registry.register(Box::new(PATTERN_REFRESHES.clone()))?;
    registry.register(Box::new(ANOMALIES_DETECTED.clone()))?;
    Ok(())
}

/// Renders a registry in the Prometheus text exposition format.
pub fn render(registry: &Registry) -> Result<String, ServiceError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| ServiceError::InternalError(format!("failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ServiceError::InternalError(format!("metrics are not utf-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_counters_render() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();

        FORECAST_RUNS.inc();
        FORECAST_FAILURES.with_label_values(&["no_data"]).inc();

        let text = render(&registry).unwrap();
        assert!(text.contains("demand_forecast_runs_total"));
        assert!(text.contains("error_type=\"no_data\""));
    }

    #[test]
    fn double_registration_is_rejected() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        assert!(register_metrics(&registry).is_err());
    }
}
