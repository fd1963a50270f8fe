/*!
 * # Surge Identification
 *
 * Scans a forecast series for contiguous runs above `baseline × threshold_multiplier`
 * and grades each run by its peak ratio.
 */

use chrono::Duration;

use crate::config::SurgeConfig;
use crate::ml::statistics;
use crate::models::{DemandSeries, Forecast, Scope, Severity, SurgePeriod};

/// Mean of the last `window` observations; `None` for an empty series.
pub fn baseline_from_history(series: &DemandSeries, window: usize) -> Option<f64> {
    let recent: Vec<f64> = series.tail(window).iter().map(|o| o.demand).collect();
    statistics::mean(&recent)
}

#[derive(Debug, Clone, Default)]
pub struct SurgeIdentifier {
    config: SurgeConfig,
}

impl SurgeIdentifier {
    pub fn new(config: SurgeConfig) -> Self {
        Self { config }
    }

    pub fn baseline_window(&self) -> usize {
        self.config.baseline_window
    }

    /// Severity band for a peak-to-baseline ratio.
    pub fn severity_for(&self, ratio: f64) -> Severity {
        if ratio > self.config.high_multiplier {
            Severity::High
        } else if ratio >= self.config.medium_multiplier {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Merges consecutive surge days of `forecasts` into periods.
    ///
    /// Forecasts of other scopes are ignored. A non-positive baseline yields no
    /// surges.
    pub fn identify(&self, scope: &Scope, forecasts: &[Forecast], baseline: f64) -> Vec<SurgePeriod> {
        if !baseline.is_finite() || baseline <= 0.0 {
            return Vec::new();
        }
        let threshold = baseline * self.config.threshold_multiplier;

        let mut days: Vec<&Forecast> = forecasts.iter().filter(|f| &f.scope == scope).collect();
        days.sort_by_key(|f| f.forecast_date);

        let mut surges: Vec<SurgePeriod> = Vec::new();
        let mut current: Option<SurgePeriod> = None;

        for day in days {
            let value = day.predicted_demand;
            if value <= threshold {
                surges.extend(current.take());
                continue;
            }

            match current.as_mut() {
                Some(surge) if surge.end_date + Duration::days(1) == day.forecast_date => {
                    surge.end_date = day.forecast_date;
                    if value > surge.peak_value {
                        surge.peak_value = value;
                        surge.peak_ratio = value / baseline;
                        surge.severity = self.severity_for(surge.peak_ratio);
                    }
                }
                _ => {
                    // A date gap closes the open run
                    surges.extend(current.take());
                    current = Some(SurgePeriod {
                        scope: scope.clone(),
                        start_date: day.forecast_date,
                        end_date: day.forecast_date,
                        peak_value: value,
                        peak_ratio: value / baseline,
                        severity: self.severity_for(value / baseline),
                    });
                }
            }
        }
        surges.extend(current);
        surges
    }
}
