/*!
 * # Anomaly Detection
 *
 * Three independent detectors over an observed demand series:
 *
 * - statistical outliers: z-score against a trailing window that excludes the
 *   evaluated point, corroborated by the window's interquartile fences
 * - seasonal deviations: distance from the seasonally adjusted rolling baseline
 * - trend changes: slope of the most recent window against the one before it
 *
 * Every detector is a pure function of its input. A date may be flagged by more
 * than one method. [`AnomalyDetector::assess_value`] scores a single incoming
 * value against the recent history without a full pass.
 */

use chrono::NaiveDate;
use tracing::debug;

use crate::config::AnomalyConfig;
use crate::errors::ServiceError;
use crate::ml::statistics;
use crate::models::{
    AnomalyFinding, AnomalyMethod, AnomalyReport, DemandSeries, PatternType, RealtimeAssessment,
    SeasonalSnapshot, Sensitivity, Severity, SkippedDetector,
};

/// Deviations smaller than this from a constant window are treated as equal.
const FLAT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    fn trailing<'a>(&self, values: &'a [f64], idx: usize) -> &'a [f64] {
        &values[idx.saturating_sub(self.config.window)..idx]
    }

    /// Flags points whose z-score against the trailing window exceeds the thresholds.
    ///
    /// The z-score and the Tukey fences of the same window vote separately: a
    /// medium z-score outside the fences is raised to high, and a point outside
    /// the fences alone is low. A constant window has no spread: a point equal
    /// to it is skipped, a point that departs from it is flagged high.
    pub fn statistical_outliers(&self, series: &DemandSeries) -> Vec<AnomalyFinding> {
        let values = series.values();
        let mut findings = Vec::new();

        for (idx, obs) in series.observations().iter().enumerate() {
            let window = self.trailing(&values, idx);
            if window.len() < self.config.min_samples {
                continue;
            }
            let (Some(mean), Some(sd)) = (statistics::mean(window), statistics::std_dev(window))
            else {
                continue;
            };

            let deviation = obs.demand - mean;
            let (severity, description) = if sd < FLAT_EPSILON {
                if deviation.abs() < FLAT_EPSILON {
                    continue;
                }
                (
                    Severity::High,
                    format!(
                        "Demand {:.2} departs from a constant trailing level of {:.2}",
                        obs.demand, mean
                    ),
                )
            } else {
                let z = deviation / sd;
                let outside_fences = statistics::iqr_bounds(window, self.config.iqr_multiplier)
                    .map_or(false, |(low, high)| obs.demand < low || obs.demand > high);
                let severity = match (z.abs(), outside_fences) {
                    (z, _) if z > self.config.z_high => Severity::High,
                    (z, true) if z > self.config.z_medium => Severity::High,
                    (z, false) if z > self.config.z_medium => Severity::Medium,
                    (_, true) => Severity::Low,
                    _ => continue,
                };
                let fences = if outside_fences {
                    ", outside the interquartile fences"
                } else {
                    ""
                };
                (
                    severity,
                    format!(
                        "Demand {:.2} is {:.2} standard deviations from the trailing mean {:.2}{}",
                        obs.demand, z, mean, fences
                    ),
                )
            };

            let band = self.config.z_medium * sd;
            findings.push(AnomalyFinding {
                scope: series.scope().clone(),
                date: obs.date,
                method: AnomalyMethod::Statistical,
                observed_value: obs.demand,
                expected_range: ((mean - band).max(0.0), mean + band),
                severity,
                description,
            });
        }

        findings
    }

    /// Flags points that stray from `baseline × multiplier(date)` by more than
    /// the seasonal threshold.
    ///
    /// The baseline is the mean of the deseasonalised trailing window. Without a
    /// detected pattern set in the snapshot there is nothing to compare against.
    pub fn seasonal_deviations(
        &self,
        series: &DemandSeries,
        snapshot: &SeasonalSnapshot,
    ) -> Vec<AnomalyFinding> {
        if !has_detected_pattern(snapshot) {
            debug!(scope = %series.scope(), "no seasonal pattern detected, seasonal detector idle");
            return Vec::new();
        }

        let deseasonalised: Vec<f64> = series
            .observations()
            .iter()
            .map(|o| o.demand / snapshot.combined_multiplier(o.date))
            .collect();
        let mut findings = Vec::new();

        for (idx, obs) in series.observations().iter().enumerate() {
            let window = self.trailing(&deseasonalised, idx);
            if window.len() < self.config.min_samples {
                continue;
            }
            let Some(baseline) = statistics::mean(window) else {
                continue;
            };

            let expected = baseline * snapshot.combined_multiplier(obs.date);
            let relative = (obs.demand - expected).abs() / expected.max(1.0);
            if relative <= self.config.seasonal_threshold {
                continue;
            }
            let severity = if relative > self.config.seasonal_high_deviation {
                Severity::High
            } else if relative > self.config.seasonal_medium_deviation {
                Severity::Medium
            } else {
                Severity::Low
            };

            let allowed = self.config.seasonal_threshold * expected.max(1.0);
            findings.push(AnomalyFinding {
                scope: series.scope().clone(),
                date: obs.date,
                method: AnomalyMethod::Seasonal,
                observed_value: obs.demand,
                expected_range: ((expected - allowed).max(0.0), expected + allowed),
                severity,
                description: format!(
                    "Demand {:.2} deviates {:.0}% from the seasonal expectation {:.2}",
                    obs.demand,
                    relative * 100.0,
                    expected
                ),
            });
        }

        findings
    }

    /// Compares the slope of the most recent window with the adjacent prior one.
    ///
    /// Both slopes are Theil-Sen estimates, so a lone spike inside either window
    /// leaves them unchanged. Slopes within `trend_flat_slope_ratio × mean level` of zero count as flat.
    /// A sign reversal between two non-flat slopes is high severity; a relative
    /// slope change above `trend_change_threshold` is medium. The finding is
    /// dated at the last observation.
    pub fn trend_changes(&self, series: &DemandSeries) -> Vec<AnomalyFinding> {
        let tw = self.config.trend_window;
        let values = series.values();
        if values.len() < tw * 2 {
            return Vec::new();
        }

        let recent = &values[values.len() - tw..];
        let prior = &values[values.len() - 2 * tw..values.len() - tw];
        let (Some(recent_fit), Some(prior_fit)) = (
            statistics::theil_sen(recent),
            statistics::theil_sen(prior),
        ) else {
            return Vec::new();
        };
        let level = statistics::mean(&values[values.len() - 2 * tw..]).unwrap_or(0.0);
        let floor = (self.config.trend_flat_slope_ratio * level.abs()).max(FLAT_EPSILON);

        let recent_flat = recent_fit.slope.abs() <= floor;
        let prior_flat = prior_fit.slope.abs() <= floor;
        if recent_flat && prior_flat {
            return Vec::new();
        }

        let (severity, description) = if !recent_flat
            && !prior_flat
            && recent_fit.slope.signum() != prior_fit.slope.signum()
        {
            (
                Severity::High,
                format!(
                    "Demand trend reversed: slope {:+.2}/day over the prior {} days, {:+.2}/day over the last {}",
                    prior_fit.slope, tw, recent_fit.slope, tw
                ),
            )
        } else {
            let change = if prior_flat {
                f64::INFINITY
            } else {
                (recent_fit.slope - prior_fit.slope).abs() / prior_fit.slope.abs()
            };
            if change <= self.config.trend_change_threshold {
                return Vec::new();
            }
            (
                Severity::Medium,
                format!(
                    "Demand slope changed from {:+.2}/day to {:+.2}/day",
                    prior_fit.slope, recent_fit.slope
                ),
            )
        };

        let Some(last) = series.observations().last() else {
            return Vec::new();
        };
        // Where the prior trend would have put the last observation
        let projected = prior_fit.at((2 * tw - 1) as f64);
        let residual = prior
            .iter()
            .enumerate()
            .map(|(i, v)| (v - prior_fit.at(i as f64)).powi(2))
            .sum::<f64>()
            / tw as f64;
        let band = self.config.z_medium * residual.sqrt();

        vec![AnomalyFinding {
            scope: series.scope().clone(),
            date: last.date,
            method: AnomalyMethod::Trend,
            observed_value: last.demand,
            expected_range: ((projected - band).max(0.0), (projected + band).max(0.0)),
            severity,
            description,
        }]
    }

    /// Runs all three detectors and summarises their findings.
    ///
    /// Detectors without enough input are listed as skipped with the reason.
    /// An empty series is `NoData`.
    pub fn analyze(
        &self,
        series: &DemandSeries,
        snapshot: Option<&SeasonalSnapshot>,
    ) -> Result<AnomalyReport, ServiceError> {
        if series.is_empty() {
            return Err(ServiceError::NoData(format!(
                "no observations for scope {}",
                series.scope()
            )));
        }

        let mut findings = Vec::new();
        let mut skipped = Vec::new();

        let statistical_required = self.config.min_samples + 1;
        if series.len() < statistical_required {
            skipped.push(SkippedDetector {
                method: AnomalyMethod::Statistical,
                reason: ServiceError::InsufficientHistory {
                    required: statistical_required,
                    available: series.len(),
                }
                .to_string(),
            });
        } else {
            findings.extend(self.statistical_outliers(series));
        }

        match snapshot {
            Some(snapshot) if has_detected_pattern(snapshot) => {
                findings.extend(self.seasonal_deviations(series, snapshot));
            }
            _ => skipped.push(SkippedDetector {
                method: AnomalyMethod::Seasonal,
                reason: "no seasonal pattern detected for scope".to_string(),
            }),
        }

        let trend_required = self.config.trend_window * 2;
        if series.len() < trend_required {
            skipped.push(SkippedDetector {
                method: AnomalyMethod::Trend,
                reason: ServiceError::InsufficientHistory {
                    required: trend_required,
                    available: series.len(),
                }
                .to_string(),
            });
        } else {
            findings.extend(self.trend_changes(series));
        }

        for skip in &skipped {
            debug!(scope = %series.scope(), method = %skip.method, reason = %skip.reason, "anomaly detector skipped");
        }

        Ok(AnomalyReport::new(
            series.scope().clone(),
            series.len(),
            findings,
            skipped,
        ))
    }
}

impl AnomalyDetector {
    /// Scores one incoming value against the last `window` observations.
    ///
    /// The value is anomalous when it strays from the recent mean by more than
    /// `sensitivity.threshold_multiplier()` standard deviations. Severity follows
    /// the z thresholds regardless of sensitivity.
    pub fn assess_value(
        &self,
        history: &[f64],
        value: f64,
        sensitivity: Sensitivity,
    ) -> Result<RealtimeAssessment, ServiceError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ServiceError::InvalidInput(format!(
                "demand must be a finite non-negative number, got {value}"
            )));
        }
        let recent = &history[history.len().saturating_sub(self.config.window)..];
        let (Some(mean), Some(sd)) = (statistics::mean(recent), statistics::std_dev(recent)) else {
            return Err(ServiceError::NoData(
                "no recent observations to assess against".to_string(),
            ));
        };

        let multiplier = sensitivity.threshold_multiplier();
        let deviation = (value - mean).abs();
        let band = multiplier * sd;

        let (is_anomaly, severity, confidence) = if sd < FLAT_EPSILON {
            if deviation < FLAT_EPSILON {
                (false, Severity::Low, 0.0)
            } else {
                (true, Severity::High, 1.0)
            }
        } else {
            let z = deviation / sd;
            let severity = if z > self.config.z_high {
                Severity::High
            } else if z > self.config.z_medium {
                Severity::Medium
            } else {
                Severity::Low
            };
            (deviation > band, severity, (z / multiplier).min(1.0))
        };

        Ok(RealtimeAssessment {
            value,
            is_anomaly,
            severity,
            confidence,
            expected_range: ((mean - band).max(0.0), mean + band),
            samples: recent.len(),
        })
    }
}

fn has_detected_pattern(snapshot: &SeasonalSnapshot) -> bool {
    snapshot.is_detected(PatternType::Weekly) || snapshot.is_detected(PatternType::Monthly)
}

/// Dates flagged by any finding, ascending and deduplicated.
pub fn flagged_dates(findings: &[AnomalyFinding]) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = findings.iter().map(|f| f.date).collect();
    dates.sort();
    dates.dedup();
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeasonalityConfig;
    use crate::ml::seasonality::SeasonalPatternDetector;
    use crate::models::Scope;
    use chrono::{DateTime, Utc};

    fn start() -> NaiveDate {
        // Monday
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn series(values: &[f64]) -> DemandSeries {
        DemandSeries::from_daily_values(Scope::tenant("acme").unwrap(), start(), values).unwrap()
    }

    fn spike_series() -> DemandSeries {
        let mut values = vec![50.0; 30];
        values[14] = 200.0;
        series(&values)
    }

    #[test]
    fn spike_is_a_high_statistical_outlier() {
        let detector = AnomalyDetector::default();
        let findings = detector.statistical_outliers(&spike_series());

        let day15 = start() + chrono::Duration::days(14);
        assert_eq!(flagged_dates(&findings), vec![day15]);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].observed_value, 200.0);
    }

    #[test]
    fn spike_is_not_a_trend_change() {
        let detector = AnomalyDetector::default();
        assert!(detector.trend_changes(&spike_series()).is_empty());
    }

    #[test]
    fn spike_inside_the_recent_window_is_not_a_trend_change() {
        let mut values = vec![50.0; 30];
        values[24] = 200.0;
        let detector = AnomalyDetector::default();
        assert!(detector.trend_changes(&series(&values)).is_empty());

        let report = detector.analyze(&series(&values), None).unwrap();
        assert_eq!(report.count(AnomalyMethod::Trend), 0);
        assert_eq!(report.count(AnomalyMethod::Statistical), 1);
    }

    #[test]
    fn constant_series_has_no_outliers() {
        let detector = AnomalyDetector::default();
        assert!(detector.statistical_outliers(&series(&[50.0; 30])).is_empty());
    }

    #[test]
    fn moderate_outlier_is_medium() {
        let mut values: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 48.0 } else { 52.0 }).collect();
        // trailing sd is 2, so 55 is z = 2.5
        values.push(55.0);
        let findings = AnomalyDetector::default().statistical_outliers(&series(&values));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn outlier_beyond_the_fences_is_raised_to_high() {
        // trailing sd is about 3.78 and the fences collapse onto 50
        let mut values = vec![50.0, 40.0, 50.0, 50.0, 50.0, 50.0, 60.0];
        values.extend([50.0; 7]);
        values.push(59.0);
        let findings = AnomalyDetector::default().statistical_outliers(&series(&values));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].description.contains("interquartile"));
    }

    #[test]
    fn fence_breach_alone_is_low() {
        let mut values = vec![50.0, 0.0, 50.0, 50.0, 50.0, 50.0, 100.0];
        values.extend([50.0; 7]);
        // z is about 0.53, well inside the z thresholds
        values.push(60.0);
        let findings = AnomalyDetector::default().statistical_outliers(&series(&values));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].date, start() + chrono::Duration::days(14));
    }

    #[test]
    fn assess_value_scales_with_sensitivity() {
        let history: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 48.0 } else { 52.0 }).collect();
        let detector = AnomalyDetector::default();

        // 55 is 2.5 standard deviations out
        let relaxed = detector.assess_value(&history, 55.0, Sensitivity::Low).unwrap();
        assert!(!relaxed.is_anomaly);
        assert_eq!(relaxed.severity, Severity::Medium);
        assert_eq!(relaxed.samples, 14);

        let strict = detector.assess_value(&history, 55.0, Sensitivity::High).unwrap();
        assert!(strict.is_anomaly);
        assert!((strict.confidence - 1.0).abs() < 1e-9);
        assert!((strict.expected_range.0 - 47.0).abs() < 1e-9);
        assert!((strict.expected_range.1 - 53.0).abs() < 1e-9);

        let usual = detector.assess_value(&history, 51.0, Sensitivity::Medium).unwrap();
        assert!(!usual.is_anomaly);
        assert_eq!(usual.severity, Severity::Low);
    }

    #[test]
    fn assess_value_against_a_flat_history() {
        let detector = AnomalyDetector::default();
        let same = detector.assess_value(&[50.0; 10], 50.0, Sensitivity::High).unwrap();
        assert!(!same.is_anomaly);
        let off = detector.assess_value(&[50.0; 10], 51.0, Sensitivity::Low).unwrap();
        assert!(off.is_anomaly);
        assert_eq!(off.severity, Severity::High);

        assert!(matches!(
            detector.assess_value(&[], 5.0, Sensitivity::Medium),
            Err(ServiceError::NoData(_))
        ));
        assert!(matches!(
            detector.assess_value(&[50.0; 10], -1.0, Sensitivity::Medium),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn reversal_is_a_high_trend_change() {
        let mut values: Vec<f64> = (0..7).map(|i| 20.0 + 5.0 * i as f64).collect();
        values.extend((0..7).map(|i| 50.0 - 5.0 * i as f64));
        let findings = AnomalyDetector::default().trend_changes(&series(&values));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].method, AnomalyMethod::Trend);
        assert_eq!(findings[0].date, start() + chrono::Duration::days(13));
    }

    #[test]
    fn acceleration_is_a_medium_trend_change() {
        let mut values: Vec<f64> = (0..7).map(|i| 20.0 + 1.0 * i as f64).collect();
        values.extend((0..7).map(|i| 27.0 + 4.0 * i as f64));
        let findings = AnomalyDetector::default().trend_changes(&series(&values));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn steady_slope_is_not_a_trend_change() {
        let values: Vec<f64> = (0..14).map(|i| 20.0 + 2.0 * i as f64).collect();
        assert!(AnomalyDetector::default()
            .trend_changes(&series(&values))
            .is_empty());
    }

    #[test]
    fn seasonal_detector_uses_the_weekday_expectation() {
        // Weekdays 100, weekends 50, eight weeks; then a weekend day at 100
        let mut values: Vec<f64> = (0..56)
            .map(|i| if i % 7 < 5 { 100.0 } else { 50.0 })
            .collect();
        values[54] = 100.0; // Saturday of week 8
        let history = series(&values);
        let at = DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let snapshot = SeasonalPatternDetector::new(SeasonalityConfig::default()).detect(&history, at);

        let findings = AnomalyDetector::default().seasonal_deviations(&history, &snapshot);
        let saturday = start() + chrono::Duration::days(54);
        assert!(findings.iter().any(|f| f.date == saturday));
        // A regular Saturday matches its seasonal expectation
        let earlier_saturday = start() + chrono::Duration::days(47);
        assert!(findings.iter().all(|f| f.date != earlier_saturday));
    }

    #[test]
    fn analyze_reports_skipped_detectors() {
        let detector = AnomalyDetector::default();
        let report = detector.analyze(&spike_series(), None).unwrap();
        assert_eq!(report.count(AnomalyMethod::Statistical), 1);
        assert_eq!(report.count(AnomalyMethod::Trend), 0);
        assert_eq!(report.high_severity_count, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].method, AnomalyMethod::Seasonal);

        let short = detector.analyze(&series(&[10.0, 11.0]), None).unwrap();
        assert_eq!(short.skipped.len(), 3);
        assert!(short.skipped[0].reason.contains("Insufficient history"));
    }

    #[test]
    fn analyze_rejects_an_empty_series() {
        let empty = DemandSeries::new(Scope::tenant("acme").unwrap(), Vec::new()).unwrap();
        assert!(matches!(
            AnomalyDetector::default().analyze(&empty, None),
            Err(ServiceError::NoData(_))
        ));
    }

    #[test]
    fn detectors_are_deterministic() {
        let detector = AnomalyDetector::default();
        let s = spike_series();
        assert_eq!(
            detector.analyze(&s, None).unwrap(),
            detector.analyze(&s, None).unwrap()
        );
    }
}
