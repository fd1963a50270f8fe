use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::entities::{demand_forecast, demand_observation, seasonal_pattern};
use crate::errors::{ResultExt, ServiceError};
use crate::models::{
    DemandSeries, Forecast, ForecastKey, Observation, Scope, SeasonalPattern, SeasonalSnapshot,
};
use crate::repositories::{ensure_scorable, immutable, SeriesRepository};

/// Repository over the `demand_observations`, `demand_forecasts` and
/// `seasonal_patterns` tables created by [`crate::migrator::Migrator`].
#[derive(Debug, Clone)]
pub struct SeaOrmSeriesRepository {
    db: Arc<DatabaseConnection>,
}

fn flatten_txn(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(e) => ServiceError::db_error(e),
        TransactionError::Transaction(e) => e,
    }
}

impl SeaOrmSeriesRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores observations for a scope; an existing row for the same date is overwritten.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn record_observations(
        &self,
        scope: &Scope,
        observations: &[Observation],
    ) -> Result<(), ServiceError> {
        scope.ensure_valid()?;
        // Runs the same checks as DemandSeries construction
        let series = DemandSeries::new(scope.clone(), observations.to_vec())?;
        if series.is_empty() {
            return Ok(());
        }

        let rows: Vec<demand_observation::ActiveModel> = series
            .observations()
            .iter()
            .map(|o| demand_observation::Model::from_observation(scope, o).into_active_model())
            .collect();

        demand_observation::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::column(demand_observation::Column::Id)
                    .update_columns([
                        demand_observation::Column::Demand,
                        demand_observation::Column::Imputed,
                    ])
                    .to_owned(),
            )
            .exec(&*self.db)
            .await?;

        debug!(count = series.len(), "observations recorded");
        Ok(())
    }

    async fn find_forecast_model<C: sea_orm::ConnectionTrait>(
        db: &C,
        key: &ForecastKey,
    ) -> Result<Option<demand_forecast::Model>, ServiceError> {
        demand_forecast::Entity::find()
            .filter(demand_forecast::Column::ScopeKey.eq(key.scope.key()))
            .filter(demand_forecast::Column::ForecastDate.eq(key.forecast_date))
            .filter(demand_forecast::Column::HorizonDays.eq(key.horizon_days as i32))
            .one(db)
            .await
            .map_err_to_service()
    }
}

#[async_trait]
impl SeriesRepository for SeaOrmSeriesRepository {
    #[instrument(skip_all, fields(scope = %scope))]
    async fn fetch_observations(&self, scope: &Scope) -> Result<DemandSeries, ServiceError> {
        let rows = demand_observation::Entity::find()
            .filter(demand_observation::Column::ScopeKey.eq(scope.key()))
            .order_by_asc(demand_observation::Column::ObservedOn)
            .all(&*self.db)
            .await?;

        DemandSeries::new(
            scope.clone(),
            rows.iter().map(demand_observation::Model::to_observation).collect(),
        )
    }

    async fn list_scopes(&self, tenant_id: &str) -> Result<Vec<Scope>, ServiceError> {
        let pairs: Vec<(String, Option<String>)> = demand_observation::Entity::find()
            .select_only()
            .column(demand_observation::Column::TenantId)
            .column(demand_observation::Column::ProductId)
            .distinct()
            .filter(demand_observation::Column::TenantId.eq(tenant_id))
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut scopes: Vec<Scope> = pairs
            .into_iter()
            .map(|(tenant_id, product_id)| Scope {
                tenant_id,
                product_id,
            })
            .collect();
        scopes.sort();
        scopes.dedup();
        Ok(scopes)
    }

    async fn latest_patterns(
        &self,
        scope: &Scope,
    ) -> Result<Option<SeasonalSnapshot>, ServiceError> {
        let rows = seasonal_pattern::Entity::find()
            .filter(seasonal_pattern::Column::ScopeKey.eq(scope.key()))
            .order_by_asc(seasonal_pattern::Column::PatternType)
            .order_by_asc(seasonal_pattern::Column::PeriodIndex)
            .all(&*self.db)
            .await?;

        let patterns = rows
            .into_iter()
            .map(SeasonalPattern::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SeasonalSnapshot::from_patterns(scope.clone(), patterns))
    }

    #[instrument(skip_all, fields(scope = %snapshot.scope))]
    async fn replace_patterns(&self, snapshot: &SeasonalSnapshot) -> Result<(), ServiceError> {
        let scope_key = snapshot.scope.key();
        let rows: Vec<seasonal_pattern::ActiveModel> = snapshot
            .records()
            .iter()
            .map(|p| seasonal_pattern::Model::from(p).into_active_model())
            .collect();

        self.db
            .transaction::<_, (), ServiceError>(|txn| {
                Box::pin(async move {
                    seasonal_pattern::Entity::delete_many()
                        .filter(seasonal_pattern::Column::ScopeKey.eq(scope_key))
                        .exec(txn)
                        .await?;
                    if !rows.is_empty() {
                        seasonal_pattern::Entity::insert_many(rows).exec(txn).await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(flatten_txn)
    }

    async fn find_forecast(&self, key: &ForecastKey) -> Result<Option<Forecast>, ServiceError> {
        Self::find_forecast_model(&*self.db, key)
            .await?
            .map(Forecast::try_from)
            .transpose()
    }

    async fn upsert_forecasts(&self, forecasts: &[Forecast]) -> Result<(), ServiceError> {
        let forecasts = forecasts.to_vec();
        self.db
            .transaction::<_, (), ServiceError>(|txn| {
                Box::pin(async move {
                    let mut superseded = Vec::new();
                    for forecast in &forecasts {
                        let key = forecast.key();
                        if let Some(existing) = Self::find_forecast_model(txn, &key).await? {
                            if existing.accuracy_score.is_some() {
                                return Err(immutable(&key));
                            }
                            superseded.push(existing.id);
                        }
                    }

                    if !superseded.is_empty() {
                        demand_forecast::Entity::delete_many()
                            .filter(demand_forecast::Column::Id.is_in(superseded))
                            .exec(txn)
                            .await?;
                    }
                    if !forecasts.is_empty() {
                        let rows: Vec<demand_forecast::ActiveModel> = forecasts
                            .iter()
                            .map(|f| demand_forecast::Model::from(f).into_active_model())
                            .collect();
                        demand_forecast::Entity::insert_many(rows).exec(txn).await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(flatten_txn)
    }

    async fn list_forecasts(
        &self,
        scope: &Scope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Forecast>, ServiceError> {
        demand_forecast::Entity::find()
            .filter(demand_forecast::Column::ScopeKey.eq(scope.key()))
            .filter(demand_forecast::Column::ForecastDate.gte(start))
            .filter(demand_forecast::Column::ForecastDate.lte(end))
            .order_by_asc(demand_forecast::Column::ForecastDate)
            .order_by_asc(demand_forecast::Column::HorizonDays)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(Forecast::try_from)
            .collect()
    }

    async fn record_score(&self, forecast: &Forecast) -> Result<(), ServiceError> {
        let forecast = forecast.clone();
        self.db
            .transaction::<_, (), ServiceError>(|txn| {
                Box::pin(async move {
                    let stored = Self::find_forecast_model(txn, &forecast.key()).await?;
                    let current = stored.clone().map(Forecast::try_from).transpose()?;
                    ensure_scorable(&forecast, current.as_ref())?;

                    if let Some(model) = stored {
                        let mut active = model.into_active_model();
                        active.observed_actual = Set(forecast.observed_actual);
                        active.accuracy_score = Set(forecast.accuracy_score);
                        active.scored_at = Set(forecast.scored_at);
                        active.update(txn).await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(flatten_txn)
    }
}
