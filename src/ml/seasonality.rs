/*!
 * # Seasonal Pattern Detection
 *
 * Decomposes a demand series into weekday and calendar-month multipliers.
 * Each multiplier is the mean demand of its period index over the global mean;
 * its confidence falls as the coefficient of variation within the index grows.
 * Too little history, or a zero global mean, yields the neutral set
 * (multiplier 1.0, confidence 0) instead of a fabricated pattern.
 */

use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::SeasonalityConfig;
use crate::ml::statistics;
use crate::models::{DemandSeries, PatternType, SeasonalPattern, SeasonalSnapshot};

/// Multipliers are kept strictly positive so a snapshot can always deseasonalise.
const MIN_MULTIPLIER: f64 = 0.01;

#[derive(Debug, Clone, Default)]
pub struct SeasonalPatternDetector {
    config: SeasonalityConfig,
}

impl SeasonalPatternDetector {
    pub fn new(config: SeasonalityConfig) -> Self {
        Self { config }
    }

    /// Computes a full snapshot (7 weekly + 12 monthly records) for the series.
    pub fn detect(&self, series: &DemandSeries, computed_at: DateTime<Utc>) -> SeasonalSnapshot {
        let mut snapshot = SeasonalSnapshot::neutral(series.scope().clone(), computed_at);

        let global_mean = match statistics::mean(&series.values()) {
            Some(mu) if mu > 0.0 => mu,
            _ => {
                debug!(scope = %series.scope(), "zero-mean or empty series, seasonal multipliers stay neutral");
                return snapshot;
            }
        };

        if self.has_weekly_coverage(series) {
            snapshot.weekly = self.decompose(series, PatternType::Weekly, global_mean, computed_at);
        } else {
            debug!(
                scope = %series.scope(),
                span_days = series.span_days(),
                "history too short for a weekly pattern"
            );
        }

        if self.has_monthly_coverage(series) {
            snapshot.monthly =
                self.decompose(series, PatternType::Monthly, global_mean, computed_at);
        } else {
            debug!(scope = %series.scope(), "history too short for a monthly pattern");
        }

        snapshot
    }

    fn has_weekly_coverage(&self, series: &DemandSeries) -> bool {
        series.span_days() >= i64::from(self.config.min_weeks_for_weekly) * 7
    }

    fn has_monthly_coverage(&self, series: &DemandSeries) -> bool {
        let months: BTreeSet<(i32, u32)> = series
            .observations()
            .iter()
            .map(|o| (o.date.year(), o.date.month()))
            .collect();
        months.len() >= self.config.min_months_for_monthly as usize
    }

    fn decompose(
        &self,
        series: &DemandSeries,
        pattern_type: PatternType,
        global_mean: f64,
        computed_at: DateTime<Utc>,
    ) -> Vec<SeasonalPattern> {
        let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); pattern_type.period_count()];
        for obs in series.observations() {
            buckets[pattern_type.period_index(obs.date)].push(obs.demand);
        }

        buckets
            .iter()
            .enumerate()
            .map(|(idx, samples)| {
                let scope = series.scope().clone();
                let sample_size = samples.len() as u32;
                let Some(index_mean) = statistics::mean(samples) else {
                    return SeasonalPattern::neutral(
                        scope,
                        pattern_type,
                        idx as u32,
                        0,
                        computed_at,
                    );
                };
                // All samples are non-negative, so a zero mean is a constant zero index.
                let confidence = match statistics::coefficient_of_variation(samples) {
                    Some(cv) => (1.0 / (1.0 + cv)).clamp(0.0, 1.0),
                    None => 1.0,
                };
                SeasonalPattern::new(
                    scope,
                    pattern_type,
                    idx as u32,
                    (index_mean / global_mean).max(MIN_MULTIPLIER),
                    confidence,
                    sample_size,
                    computed_at,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scope;
    use chrono::NaiveDate;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn weekday_weekend_series(weeks: usize) -> DemandSeries {
        // 2024-01-01 is a Monday
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let values: Vec<f64> = (0..weeks * 7)
            .map(|i| if i % 7 < 5 { 100.0 } else { 50.0 })
            .collect();
        DemandSeries::from_daily_values(Scope::tenant("acme").unwrap(), start, &values).unwrap()
    }

    #[test]
    fn recovers_injected_weekly_pattern() {
        let detector = SeasonalPatternDetector::default();
        let snapshot = detector.detect(&weekday_weekend_series(8), at());

        assert!(snapshot.is_detected(PatternType::Weekly));
        let weekday = snapshot.weekly[2].demand_multiplier;
        let weekend = snapshot.weekly[6].demand_multiplier;
        let ratio = weekday / weekend;
        assert!((ratio - 2.0).abs() / 2.0 < 0.05, "ratio was {ratio}");
        // Constant within each index
        assert_eq!(snapshot.weekly[0].confidence_score, 1.0);
        assert_eq!(snapshot.weekly[0].sample_size, 8);
    }

    #[test]
    fn short_history_is_neutral() {
        let detector = SeasonalPatternDetector::default();
        let snapshot = detector.detect(&weekday_weekend_series(7), at());
        assert!(!snapshot.is_detected(PatternType::Weekly));
        assert!(snapshot
            .weekly
            .iter()
            .all(|p| p.demand_multiplier == 1.0 && p.confidence_score == 0.0));
        // Two calendar months are nowhere near a monthly cycle
        assert!(!snapshot.is_detected(PatternType::Monthly));
    }

    #[test]
    fn zero_mean_series_is_neutral() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series =
            DemandSeries::from_daily_values(Scope::tenant("acme").unwrap(), start, &[0.0; 70])
                .unwrap();
        let snapshot = SeasonalPatternDetector::default().detect(&series, at());
        assert!(!snapshot.is_detected(PatternType::Weekly));
    }

    #[test]
    fn monthly_pattern_needs_twelve_months() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let values: Vec<f64> = (0..365)
            .map(|i| {
                let date = start + chrono::Duration::days(i);
                if date.month() == 12 {
                    200.0
                } else {
                    100.0
                }
            })
            .collect();
        let series =
            DemandSeries::from_daily_values(Scope::tenant("acme").unwrap(), start, &values)
                .unwrap();
        let snapshot = SeasonalPatternDetector::default().detect(&series, at());

        assert!(snapshot.is_detected(PatternType::Monthly));
        assert!(snapshot.monthly[11].demand_multiplier > snapshot.monthly[0].demand_multiplier);
        assert_eq!(snapshot.monthly[0].sample_size, 31);
    }

    #[test]
    fn detection_is_deterministic() {
        let detector = SeasonalPatternDetector::default();
        let series = weekday_weekend_series(10);
        assert_eq!(detector.detect(&series, at()), detector.detect(&series, at()));
    }
}
