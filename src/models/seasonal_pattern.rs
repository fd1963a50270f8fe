use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::models::{record_id, Scope};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatternType {
    /// Day of week, Monday = 0
    Weekly,
    /// Calendar month, January = 0
    Monthly,
}

impl PatternType {
    pub fn period_count(self) -> usize {
        match self {
            PatternType::Weekly => 7,
            PatternType::Monthly => 12,
        }
    }

    pub fn period_index(self, date: NaiveDate) -> usize {
        match self {
            PatternType::Weekly => date.weekday().num_days_from_monday() as usize,
            PatternType::Monthly => date.month0() as usize,
        }
    }
}

/// Multiplier for one period index of one pattern type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPattern {
    pub id: Uuid,
    pub scope: Scope,
    pub pattern_type: PatternType,
    pub period_index: u32,
    pub demand_multiplier: f64,
    pub confidence_score: f64,
    pub sample_size: u32,
    pub computed_at: DateTime<Utc>,
}

impl SeasonalPattern {
    pub fn new(
        scope: Scope,
        pattern_type: PatternType,
        period_index: u32,
        demand_multiplier: f64,
        confidence_score: f64,
        sample_size: u32,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let id = record_id(&format!(
            "pattern:{}:{}:{}:{}",
            scope.key(),
            pattern_type,
            period_index,
            computed_at.to_rfc3339()
        ));
        Self {
            id,
            scope,
            pattern_type,
            period_index,
            demand_multiplier,
            confidence_score,
            sample_size,
            computed_at,
        }
    }

    /// "No pattern detected" record: multiplier 1.0, confidence 0.
    pub fn neutral(
        scope: Scope,
        pattern_type: PatternType,
        period_index: u32,
        sample_size: u32,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            scope,
            pattern_type,
            period_index,
            1.0,
            0.0,
            sample_size,
            computed_at,
        )
    }
}

/// A complete, versioned set of seasonal multipliers for one scope.
///
/// Recomputed wholesale; callers pass a snapshot explicitly into the predictor
/// and the seasonal anomaly detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalSnapshot {
    pub scope: Scope,
    pub computed_at: DateTime<Utc>,
    /// Seven records ordered by period index
    pub weekly: Vec<SeasonalPattern>,
    /// Twelve records ordered by period index
    pub monthly: Vec<SeasonalPattern>,
}

impl SeasonalSnapshot {
    /// Snapshot whose every multiplier is neutral.
    pub fn neutral(scope: Scope, computed_at: DateTime<Utc>) -> Self {
        let build = |pattern_type: PatternType| {
            (0..pattern_type.period_count() as u32)
                .map(|idx| SeasonalPattern::neutral(scope.clone(), pattern_type, idx, 0, computed_at))
                .collect()
        };
        Self {
            weekly: build(PatternType::Weekly),
            monthly: build(PatternType::Monthly),
            scope,
            computed_at,
        }
    }

    /// Rebuilds a snapshot from stored records, e.g. as returned by a repository.
    ///
    /// Returns `None` for an empty record set. Missing indices are filled with
    /// neutral records so lookups never fail.
    pub fn from_patterns(scope: Scope, patterns: Vec<SeasonalPattern>) -> Option<Self> {
        let computed_at = patterns.iter().map(|p| p.computed_at).max()?;
        let mut snapshot = Self::neutral(scope, computed_at);
        for pattern in patterns {
            let slot = match pattern.pattern_type {
                PatternType::Weekly => snapshot.weekly.get_mut(pattern.period_index as usize),
                PatternType::Monthly => snapshot.monthly.get_mut(pattern.period_index as usize),
            };
            if let Some(slot) = slot {
                *slot = pattern;
            }
        }
        Some(snapshot)
    }

    pub fn patterns(&self, pattern_type: PatternType) -> &[SeasonalPattern] {
        match pattern_type {
            PatternType::Weekly => &self.weekly,
            PatternType::Monthly => &self.monthly,
        }
    }

    /// True when at least one index of the set carries a non-zero confidence.
    pub fn is_detected(&self, pattern_type: PatternType) -> bool {
        self.patterns(pattern_type)
            .iter()
            .any(|p| p.confidence_score > 0.0)
    }

    /// Multiplier of one set for `date`; neutral if the set was not detected.
    pub fn multiplier(&self, pattern_type: PatternType, date: NaiveDate) -> f64 {
        if !self.is_detected(pattern_type) {
            return 1.0;
        }
        self.patterns(pattern_type)
            .get(pattern_type.period_index(date))
            .map(|p| p.demand_multiplier)
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or(1.0)
    }

    /// Combined weekly × monthly multiplier for `date`.
    pub fn combined_multiplier(&self, date: NaiveDate) -> f64 {
        self.multiplier(PatternType::Weekly, date) * self.multiplier(PatternType::Monthly, date)
    }

    /// All records, weekly first.
    pub fn records(&self) -> Vec<SeasonalPattern> {
        self.weekly.iter().chain(self.monthly.iter()).cloned().collect()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.computed_at > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn period_indices_start_at_monday_and_january() {
        // 2024-01-01 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(PatternType::Weekly.period_index(monday), 0);
        assert_eq!(PatternType::Weekly.period_index(sunday), 6);
        assert_eq!(PatternType::Monthly.period_index(monday), 0);
        assert_eq!(
            PatternType::Monthly.period_index(NaiveDate::from_ymd_opt(2024, 12, 5).unwrap()),
            11
        );
    }

    #[test]
    fn neutral_snapshot_has_unit_multipliers() {
        let scope = Scope::tenant("acme").unwrap();
        let snapshot = SeasonalSnapshot::neutral(scope, at());
        assert_eq!(snapshot.weekly.len(), 7);
        assert_eq!(snapshot.monthly.len(), 12);
        assert!(!snapshot.is_detected(PatternType::Weekly));
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(snapshot.combined_multiplier(date), 1.0);
    }

    #[test]
    fn snapshot_round_trips_through_records() {
        let scope = Scope::tenant("acme").unwrap();
        let mut snapshot = SeasonalSnapshot::neutral(scope.clone(), at());
        snapshot.weekly[5] =
            SeasonalPattern::new(scope.clone(), PatternType::Weekly, 5, 0.5, 0.9, 8, at());

        let rebuilt = SeasonalSnapshot::from_patterns(scope.clone(), snapshot.records()).unwrap();
        assert_eq!(rebuilt, snapshot);
        // 2024-01-06 is a Saturday
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert_eq!(rebuilt.multiplier(PatternType::Weekly, saturday), 0.5);
        assert!(SeasonalSnapshot::from_patterns(scope, Vec::new()).is_none());
    }

    #[test]
    fn staleness_is_measured_from_computed_at() {
        let scope = Scope::tenant("acme").unwrap();
        let snapshot = SeasonalSnapshot::neutral(scope, at());
        let max_age = chrono::Duration::hours(24);
        assert!(!snapshot.is_stale(at() + chrono::Duration::hours(23), max_age));
        assert!(snapshot.is_stale(at() + chrono::Duration::hours(25), max_age));
    }
}
