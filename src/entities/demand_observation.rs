use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{record_id, Observation, Scope};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "demand_observations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub scope_key: String,
    pub tenant_id: String,
    pub product_id: Option<String>,
    pub observed_on: Date,
    #[sea_orm(column_type = "Double")]
    pub demand: f64,
    pub imputed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn from_observation(scope: &Scope, observation: &Observation) -> Self {
        Self {
            id: record_id(&format!("observation:{}:{}", scope.key(), observation.date)),
            scope_key: scope.key(),
            tenant_id: scope.tenant_id.clone(),
            product_id: scope.product_id.clone(),
            observed_on: observation.date,
            demand: observation.demand,
            imputed: observation.imputed,
        }
    }

    pub fn to_observation(&self) -> Observation {
        Observation {
            date: self.observed_on,
            demand: self.demand,
            imputed: self.imputed,
        }
    }
}
