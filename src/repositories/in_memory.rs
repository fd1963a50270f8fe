use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::models::{DemandSeries, Forecast, ForecastKey, Observation, Scope, SeasonalSnapshot};
use crate::repositories::{ensure_scorable, immutable, SeriesRepository};

/// Process-local repository backed by concurrent maps.
#[derive(Debug, Clone, Default)]
pub struct InMemorySeriesRepository {
    observations: Arc<DashMap<Scope, BTreeMap<NaiveDate, Observation>>>,
    forecasts: Arc<DashMap<ForecastKey, Forecast>>,
    patterns: Arc<DashMap<Scope, SeasonalSnapshot>>,
}

impl InMemorySeriesRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites observations of a scope, keyed by date.
    pub fn insert_observations(
        &self,
        scope: &Scope,
        observations: impl IntoIterator<Item = Observation>,
    ) -> Result<(), ServiceError> {
        scope.ensure_valid()?;
        let incoming: Vec<Observation> = observations.into_iter().collect();
        if let Some(bad) = incoming
            .iter()
            .find(|o| !o.demand.is_finite() || o.demand < 0.0)
        {
            return Err(ServiceError::InvalidInput(format!(
                "observed demand on {} must be a finite non-negative number, got {}",
                bad.date, bad.demand
            )));
        }

        let mut entry = self.observations.entry(scope.clone()).or_default();
        for obs in incoming {
            entry.insert(obs.date, obs);
        }
        Ok(())
    }

    /// Number of stored forecast records across all scopes.
    pub fn forecast_count(&self) -> usize {
        self.forecasts.len()
    }
}

#[async_trait]
impl SeriesRepository for InMemorySeriesRepository {
    async fn fetch_observations(&self, scope: &Scope) -> Result<DemandSeries, ServiceError> {
        let observations = self
            .observations
            .get(scope)
            .map(|entry| entry.values().copied().collect())
            .unwrap_or_default();
        DemandSeries::new(scope.clone(), observations)
    }

    async fn list_scopes(&self, tenant_id: &str) -> Result<Vec<Scope>, ServiceError> {
        let mut scopes: Vec<Scope> = self
            .observations
            .iter()
            .filter(|entry| entry.key().tenant_id == tenant_id && !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        // `None` sorts before `Some`, so the company-wide scope comes first
        scopes.sort();
        Ok(scopes)
    }

    async fn latest_patterns(
        &self,
        scope: &Scope,
    ) -> Result<Option<SeasonalSnapshot>, ServiceError> {
        Ok(self.patterns.get(scope).map(|entry| entry.value().clone()))
    }

    async fn replace_patterns(&self, snapshot: &SeasonalSnapshot) -> Result<(), ServiceError> {
        self.patterns
            .insert(snapshot.scope.clone(), snapshot.clone());
        Ok(())
    }

    async fn find_forecast(&self, key: &ForecastKey) -> Result<Option<Forecast>, ServiceError> {
        Ok(self.forecasts.get(key).map(|entry| entry.value().clone()))
    }

    async fn upsert_forecasts(&self, forecasts: &[Forecast]) -> Result<(), ServiceError> {
        for forecast in forecasts {
            let key = forecast.key();
            if self
                .forecasts
                .get(&key)
                .map_or(false, |existing| existing.is_scored())
            {
                return Err(immutable(&key));
            }
        }
        for forecast in forecasts {
            self.forecasts.insert(forecast.key(), forecast.clone());
        }
        Ok(())
    }

    async fn list_forecasts(
        &self,
        scope: &Scope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Forecast>, ServiceError> {
        let mut forecasts: Vec<Forecast> = self
            .forecasts
            .iter()
            .filter(|entry| {
                let key = entry.key();
                &key.scope == scope && key.forecast_date >= start && key.forecast_date <= end
            })
            .map(|entry| entry.value().clone())
            .collect();
        forecasts.sort_by(|a, b| {
            a.forecast_date
                .cmp(&b.forecast_date)
                .then(a.horizon_days.cmp(&b.horizon_days))
        });
        Ok(forecasts)
    }

    async fn record_score(&self, forecast: &Forecast) -> Result<(), ServiceError> {
        let key = forecast.key();
        match self.forecasts.get_mut(&key) {
            Some(mut stored) => {
                ensure_scorable(forecast, Some(stored.value()))?;
                *stored = forecast.clone();
                Ok(())
            }
            None => ensure_scorable(forecast, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ForecastMethod, ForecastPoint, TrendDirection};
    use assert_matches::assert_matches;
    use chrono::{DateTime, Utc};

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn forecast(scope: &Scope, d: u32, predicted: f64) -> Forecast {
        Forecast::pending(
            scope.clone(),
            ForecastPoint {
                forecast_date: day(d),
                lead_days: d,
                predicted_demand: predicted,
                confidence_lower: predicted,
                confidence_upper: predicted,
                confidence_score: 0.5,
            },
            7,
            ForecastMethod::SeasonalMovingAverage,
            TrendDirection::Stable,
            false,
            at(),
        )
    }

    #[tokio::test]
    async fn observations_come_back_sorted() {
        let repo = InMemorySeriesRepository::new();
        let scope = Scope::tenant("acme").unwrap();
        repo.insert_observations(
            &scope,
            vec![Observation::new(day(3), 3.0), Observation::new(day(1), 1.0)],
        )
        .unwrap();

        let series = repo.fetch_observations(&scope).await.unwrap();
        assert_eq!(series.values(), vec![1.0, 3.0]);

        let unknown = repo
            .fetch_observations(&Scope::tenant("other").unwrap())
            .await
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn list_scopes_is_per_tenant() {
        let repo = InMemorySeriesRepository::new();
        let obs = || vec![Observation::new(day(1), 1.0)];
        repo.insert_observations(&Scope::product("acme", "b").unwrap(), obs()).unwrap();
        repo.insert_observations(&Scope::tenant("acme").unwrap(), obs()).unwrap();
        repo.insert_observations(&Scope::product("acme", "a").unwrap(), obs()).unwrap();
        repo.insert_observations(&Scope::tenant("globex").unwrap(), obs()).unwrap();

        let scopes = repo.list_scopes("acme").await.unwrap();
        let keys: Vec<String> = scopes.iter().map(Scope::key).collect();
        assert_eq!(keys, vec!["acme", "acme/a", "acme/b"]);
    }

    #[tokio::test]
    async fn upsert_supersedes_pending_records() {
        let repo = InMemorySeriesRepository::new();
        let scope = Scope::tenant("acme").unwrap();
        repo.upsert_forecasts(&[forecast(&scope, 2, 10.0)]).await.unwrap();
        repo.upsert_forecasts(&[forecast(&scope, 2, 12.0)]).await.unwrap();

        assert_eq!(repo.forecast_count(), 1);
        let stored = repo
            .find_forecast(&forecast(&scope, 2, 0.0).key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.predicted_demand, 12.0);
    }

    #[tokio::test]
    async fn scored_records_block_the_whole_upsert() {
        let repo = InMemorySeriesRepository::new();
        let scope = Scope::tenant("acme").unwrap();
        let mut scored = forecast(&scope, 2, 10.0);
        repo.upsert_forecasts(&[scored.clone()]).await.unwrap();
        scored.observed_actual = Some(11.0);
        scored.accuracy_score = Some(0.9);
        scored.scored_at = Some(at());
        repo.record_score(&scored).await.unwrap();

        let result = repo
            .upsert_forecasts(&[forecast(&scope, 3, 5.0), forecast(&scope, 2, 99.0)])
            .await;
        assert_matches!(result, Err(ServiceError::ForecastImmutable { .. }));
        assert_eq!(repo.forecast_count(), 1);

        assert_matches!(
            repo.record_score(&scored).await,
            Err(ServiceError::ForecastImmutable { .. })
        );
    }

    #[tokio::test]
    async fn record_score_requires_a_stored_forecast() {
        let repo = InMemorySeriesRepository::new();
        let scope = Scope::tenant("acme").unwrap();
        let mut f = forecast(&scope, 2, 10.0);
        f.accuracy_score = Some(1.0);
        f.observed_actual = Some(10.0);
        assert_matches!(repo.record_score(&f).await, Err(ServiceError::NotFound(_)));
    }
}
