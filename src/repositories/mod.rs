use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::ServiceError;
use crate::models::{DemandSeries, Forecast, ForecastKey, Scope, SeasonalSnapshot};

pub mod in_memory;
pub mod sea_orm_repository;

pub use in_memory::InMemorySeriesRepository;
pub use sea_orm_repository::SeaOrmSeriesRepository;

/// Storage seam of the engine: historical series in, forecast and pattern records out.
///
/// Adapters may be backed by anything; the engine only relies on the contract
/// documented on each method.
#[async_trait]
pub trait SeriesRepository: Send + Sync {
    /// Ascending, duplicate-free observations for a scope (possibly empty).
    async fn fetch_observations(&self, scope: &Scope) -> Result<DemandSeries, ServiceError>;

    /// Every scope of a tenant that has observations, company-wide scope first.
    async fn list_scopes(&self, tenant_id: &str) -> Result<Vec<Scope>, ServiceError>;

    /// The most recently stored pattern snapshot for a scope.
    async fn latest_patterns(&self, scope: &Scope)
        -> Result<Option<SeasonalSnapshot>, ServiceError>;

    /// Replaces every stored pattern of the snapshot's scope with the snapshot.
    async fn replace_patterns(&self, snapshot: &SeasonalSnapshot) -> Result<(), ServiceError>;

    async fn find_forecast(&self, key: &ForecastKey) -> Result<Option<Forecast>, ServiceError>;

    /// Writes forecasts, superseding unscored records with the same key.
    ///
    /// If any key already holds a scored record the call fails with
    /// `ForecastImmutable` and nothing is written.
    async fn upsert_forecasts(&self, forecasts: &[Forecast]) -> Result<(), ServiceError>;

    /// Forecasts of a scope dated within `[start, end]`, ordered by date then horizon.
    async fn list_forecasts(
        &self,
        scope: &Scope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Forecast>, ServiceError>;

    /// Persists the scoring fields of a stored, still unscored forecast.
    async fn record_score(&self, forecast: &Forecast) -> Result<(), ServiceError>;
}

pub(crate) fn immutable(key: &ForecastKey) -> ServiceError {
    ServiceError::ForecastImmutable {
        scope: key.scope.key(),
        forecast_date: key.forecast_date,
        horizon_days: key.horizon_days,
    }
}

/// Shared precondition of `record_score` for every adapter.
pub(crate) fn ensure_scorable(
    incoming: &Forecast,
    stored: Option<&Forecast>,
) -> Result<(), ServiceError> {
    if !incoming.is_scored() {
        return Err(ServiceError::InvalidInput(format!(
            "forecast {} has no accuracy score to record",
            incoming.id
        )));
    }
    match stored {
        None => Err(ServiceError::NotFound(format!(
            "no forecast for {} on {} (horizon {})",
            incoming.scope, incoming.forecast_date, incoming.horizon_days
        ))),
        Some(existing) if existing.is_scored() => Err(immutable(&existing.key())),
        Some(_) => Ok(()),
    }
}
