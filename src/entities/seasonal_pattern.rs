use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::{PatternType, Scope, SeasonalPattern};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "seasonal_patterns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub scope_key: String,
    pub tenant_id: String,
    pub product_id: Option<String>,
    pub pattern_type: String,
    pub period_index: i32,
    #[sea_orm(column_type = "Double")]
    pub demand_multiplier: f64,
    #[sea_orm(column_type = "Double")]
    pub confidence_score: f64,
    pub sample_size: i32,
    pub computed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&SeasonalPattern> for Model {
    fn from(pattern: &SeasonalPattern) -> Self {
        Self {
            id: pattern.id,
            scope_key: pattern.scope.key(),
            tenant_id: pattern.scope.tenant_id.clone(),
            product_id: pattern.scope.product_id.clone(),
            pattern_type: pattern.pattern_type.to_string(),
            period_index: pattern.period_index as i32,
            demand_multiplier: pattern.demand_multiplier,
            confidence_score: pattern.confidence_score,
            sample_size: pattern.sample_size as i32,
            computed_at: pattern.computed_at,
        }
    }
}

impl TryFrom<Model> for SeasonalPattern {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let pattern_type: PatternType = model.pattern_type.parse().map_err(|_| {
            ServiceError::InternalError(format!(
                "stored pattern {} has unknown type '{}'",
                model.id, model.pattern_type
            ))
        })?;

        Ok(SeasonalPattern {
            id: model.id,
            scope: Scope {
                tenant_id: model.tenant_id,
                product_id: model.product_id,
            },
            pattern_type,
            period_index: model.period_index.max(0) as u32,
            demand_multiplier: model.demand_multiplier,
            confidence_score: model.confidence_score,
            sample_size: model.sample_size.max(0) as u32,
            computed_at: model.computed_at,
        })
    }
}
