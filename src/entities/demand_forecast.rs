use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::{Forecast, ForecastMethod, Scope, TrendDirection};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "demand_forecasts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub scope_key: String,
    pub tenant_id: String,
    pub product_id: Option<String>,
    pub forecast_date: Date,
    pub horizon_days: i32,
    pub lead_days: i32,
    pub method: String,
    #[sea_orm(column_type = "Double")]
    pub predicted_demand: f64,
    #[sea_orm(column_type = "Double")]
    pub confidence_lower: f64,
    #[sea_orm(column_type = "Double")]
    pub confidence_upper: f64,
    #[sea_orm(column_type = "Double")]
    pub confidence_score: f64,
    pub trend: String,
    pub insufficient_history: bool,
    pub generated_at: DateTime<Utc>,
    #[sea_orm(column_type = "Double", nullable)]
    pub observed_actual: Option<f64>,
    #[sea_orm(column_type = "Double", nullable)]
    pub accuracy_score: Option<f64>,
    pub scored_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Forecast> for Model {
    fn from(forecast: &Forecast) -> Self {
        Self {
            id: forecast.id,
            scope_key: forecast.scope.key(),
            tenant_id: forecast.scope.tenant_id.clone(),
            product_id: forecast.scope.product_id.clone(),
            forecast_date: forecast.forecast_date,
            horizon_days: forecast.horizon_days as i32,
            lead_days: forecast.lead_days as i32,
            method: forecast.method.to_string(),
            predicted_demand: forecast.predicted_demand,
            confidence_lower: forecast.confidence_lower,
            confidence_upper: forecast.confidence_upper,
            confidence_score: forecast.confidence_score,
            trend: forecast.trend.to_string(),
            insufficient_history: forecast.insufficient_history,
            generated_at: forecast.generated_at,
            observed_actual: forecast.observed_actual,
            accuracy_score: forecast.accuracy_score,
            scored_at: forecast.scored_at,
        }
    }
}

impl TryFrom<Model> for Forecast {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let method: ForecastMethod = model
            .method
            .parse()
            .map_err(|e: String| ServiceError::InternalError(format!("stored forecast {}: {}", model.id, e)))?;
        let trend: TrendDirection = model.trend.parse().map_err(|_| {
            ServiceError::InternalError(format!(
                "stored forecast {} has unknown trend '{}'",
                model.id, model.trend
            ))
        })?;
        let horizon_days = u32::try_from(model.horizon_days).map_err(|_| {
            ServiceError::InternalError(format!("stored forecast {} has a negative horizon", model.id))
        })?;

        Ok(Forecast {
            id: model.id,
            scope: Scope {
                tenant_id: model.tenant_id,
                product_id: model.product_id,
            },
            forecast_date: model.forecast_date,
            horizon_days,
            lead_days: model.lead_days.max(0) as u32,
            method,
            predicted_demand: model.predicted_demand,
            confidence_lower: model.confidence_lower,
            confidence_upper: model.confidence_upper,
            confidence_score: model.confidence_score,
            trend,
            insufficient_history: model.insufficient_history,
            generated_at: model.generated_at,
            observed_actual: model.observed_actual,
            accuracy_score: model.accuracy_score,
            scored_at: model.scored_at,
        })
    }
}
