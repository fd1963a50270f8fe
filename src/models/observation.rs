use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::Scope;

/// One day of observed demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub demand: f64,
    /// True when the value was filled in for a missing day rather than observed
    #[serde(default)]
    pub imputed: bool,
}

impl Observation {
    pub fn new(date: NaiveDate, demand: f64) -> Self {
        Self {
            date,
            demand,
            imputed: false,
        }
    }
}

/// Ascending, duplicate-free, non-negative demand history for one scope.
///
/// Gaps are allowed. The engine never treats a missing day as zero unless
/// [`DemandSeries::fill_gaps`] is called, which marks every inserted point as imputed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandSeries {
    scope: Scope,
    observations: Vec<Observation>,
}

impl DemandSeries {
    pub fn new(scope: Scope, mut observations: Vec<Observation>) -> Result<Self, ServiceError> {
        if let Some(bad) = observations
            .iter()
            .find(|o| !o.demand.is_finite() || o.demand < 0.0)
        {
            return Err(ServiceError::InvalidInput(format!(
                "observed demand on {} must be a finite non-negative number, got {}",
                bad.date, bad.demand
            )));
        }

        observations.sort_by_key(|o| o.date);
        if let Some(pair) = observations.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(ServiceError::InvalidInput(format!(
                "duplicate observation for {} in scope {}",
                pair[0].date, scope
            )));
        }

        Ok(Self {
            scope,
            observations,
        })
    }

    /// Convenience constructor for consecutive daily values starting at `start`.
    pub fn from_daily_values(
        scope: Scope,
        start: NaiveDate,
        values: &[f64],
    ) -> Result<Self, ServiceError> {
        let observations = values
            .iter()
            .enumerate()
            .map(|(offset, &demand)| Observation::new(start + Duration::days(offset as i64), demand))
            .collect();
        Self::new(scope, observations)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.demand).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// Inclusive day span between first and last observation.
    pub fn span_days(&self) -> i64 {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => (last - first).num_days() + 1,
            _ => 0,
        }
    }

    /// The most recent `n` observations (or all of them).
    pub fn tail(&self, n: usize) -> &[Observation] {
        let start = self.observations.len().saturating_sub(n);
        &self.observations[start..]
    }

    pub fn demand_on(&self, date: NaiveDate) -> Option<f64> {
        self.observations
            .binary_search_by_key(&date, |o| o.date)
            .ok()
            .map(|idx| self.observations[idx].demand)
    }

    /// Returns a copy with every missing day filled with an imputed zero.
    pub fn fill_gaps(&self) -> Self {
        let mut filled = Vec::with_capacity(self.span_days().max(0) as usize);
        for pair in self.observations.windows(2) {
            filled.push(pair[0]);
            let mut day = pair[0].date + Duration::days(1);
            while day < pair[1].date {
                filled.push(Observation {
                    date: day,
                    demand: 0.0,
                    imputed: true,
                });
                day += Duration::days(1);
            }
        }
        if let Some(last) = self.observations.last() {
            filled.push(*last);
        }

        Self {
            scope: self.scope.clone(),
            observations: filled,
        }
    }

    pub fn imputed_count(&self) -> usize {
        self.observations.iter().filter(|o| o.imputed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn scope() -> Scope {
        Scope::tenant("acme").unwrap()
    }

    #[test]
    fn observations_are_sorted_on_construction() {
        let series = DemandSeries::new(
            scope(),
            vec![
                Observation::new(day(3), 30.0),
                Observation::new(day(1), 10.0),
                Observation::new(day(2), 20.0),
            ],
        )
        .unwrap();
        assert_eq!(series.values(), vec![10.0, 20.0, 30.0]);
        assert_eq!(series.last_date(), Some(day(3)));
    }

    #[test]
    fn negative_and_duplicate_observations_are_rejected() {
        assert_matches!(
            DemandSeries::new(scope(), vec![Observation::new(day(1), -1.0)]),
            Err(ServiceError::InvalidInput(_))
        );
        assert_matches!(
            DemandSeries::new(scope(), vec![Observation::new(day(1), f64::NAN)]),
            Err(ServiceError::InvalidInput(_))
        );
        assert_matches!(
            DemandSeries::new(
                scope(),
                vec![Observation::new(day(1), 1.0), Observation::new(day(1), 2.0)]
            ),
            Err(ServiceError::InvalidInput(_))
        );
    }

    #[test]
    fn gaps_are_kept_until_explicitly_filled() {
        let series = DemandSeries::new(
            scope(),
            vec![Observation::new(day(1), 10.0), Observation::new(day(4), 40.0)],
        )
        .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.span_days(), 4);
        assert_eq!(series.imputed_count(), 0);

        let filled = series.fill_gaps();
        assert_eq!(filled.len(), 4);
        assert_eq!(filled.imputed_count(), 2);
        assert_eq!(filled.values(), vec![10.0, 0.0, 0.0, 40.0]);
        assert!(filled.observations()[1].imputed);
        assert!(!filled.observations()[3].imputed);
    }

    #[test]
    fn tail_and_lookup() {
        let series =
            DemandSeries::from_daily_values(scope(), day(1), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(series.tail(2).len(), 2);
        assert_eq!(series.tail(10).len(), 4);
        assert_eq!(series.demand_on(day(3)), Some(3.0));
        assert_eq!(series.demand_on(day(9)), None);
    }
}
