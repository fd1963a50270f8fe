/*!
 * # Staffing Recommendations
 *
 * Translates forecast demand into headcount per role.
 *
 * The default [`DirectCapacity`] strategy divides demand by per-role throughput
 * and applies a minimum floor. It ignores queueing effects (arrival variance,
 * uneven shift coverage); a higher-fidelity model belongs behind
 * [`StaffingStrategy`] as a separate strategy.
 */

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{RoleCapacity, StaffingConfig};
use crate::errors::ServiceError;
use crate::models::{Forecast, StaffingPlan};

/// Capacity-planning model mapping one day of demand to headcount.
pub trait StaffingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn plan(
        &self,
        date: NaiveDate,
        predicted_demand: f64,
        roles: &[RoleCapacity],
    ) -> Result<StaffingPlan, ServiceError>;
}

/// `max(minimum_staff, ceil(demand / units_per_worker_per_day))` per role.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectCapacity;

impl StaffingStrategy for DirectCapacity {
    fn name(&self) -> &'static str {
        "direct_capacity"
    }

    fn plan(
        &self,
        date: NaiveDate,
        predicted_demand: f64,
        roles: &[RoleCapacity],
    ) -> Result<StaffingPlan, ServiceError> {
        if !predicted_demand.is_finite() || predicted_demand < 0.0 {
            return Err(ServiceError::InvalidInput(format!(
                "predicted demand for {} must be a finite non-negative number, got {}",
                date, predicted_demand
            )));
        }

        let mut requirements = BTreeMap::new();
        let mut parts = Vec::with_capacity(roles.len());
        for role in roles {
            if !role.units_per_worker_per_day.is_finite() || role.units_per_worker_per_day <= 0.0 {
                return Err(ServiceError::ValidationError(format!(
                    "role '{}' must have a positive units_per_worker_per_day",
                    role.role
                )));
            }
            let needed = (predicted_demand / role.units_per_worker_per_day).ceil() as u32;
            let count = needed.max(role.minimum_staff);
            requirements.insert(role.role.clone(), count);
            parts.push(format!(
                "{} {} ({:.0} units/day each)",
                count, role.role, role.units_per_worker_per_day
            ));
        }

        Ok(StaffingPlan {
            date,
            predicted_demand,
            requirements,
            reasoning: format!(
                "Based on {:.0} predicted units on {}, recommend {}.",
                predicted_demand,
                date,
                parts.join(", ")
            ),
        })
    }
}

#[derive(Clone)]
pub struct StaffingCalculator {
    config: StaffingConfig,
    strategy: Arc<dyn StaffingStrategy>,
}

impl std::fmt::Debug for StaffingCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaffingCalculator")
            .field("config", &self.config)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl StaffingCalculator {
    pub fn new(config: StaffingConfig) -> Self {
        Self::with_strategy(config, Arc::new(DirectCapacity))
    }

    pub fn with_strategy(config: StaffingConfig, strategy: Arc<dyn StaffingStrategy>) -> Self {
        Self { config, strategy }
    }

    pub fn plan_day(&self, date: NaiveDate, predicted_demand: f64) -> Result<StaffingPlan, ServiceError> {
        self.strategy.plan(date, predicted_demand, &self.config.roles)
    }

    /// One plan per forecast day, in forecast order.
    pub fn plan_forecasts(&self, forecasts: &[Forecast]) -> Result<Vec<StaffingPlan>, ServiceError> {
        forecasts
            .iter()
            .map(|f| self.plan_day(f.forecast_date, f.predicted_demand))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    #[rstest]
    #[case(0.0, 1, 1)]
    #[case(15.0, 1, 1)]
    #[case(16.0, 2, 1)]
    #[case(100.0, 7, 4)]
    fn default_roles_round_up(#[case] demand: f64, #[case] techs: u32, #[case] engineers: u32) {
        let calculator = StaffingCalculator::new(StaffingConfig::default());
        let plan = calculator.plan_day(day(), demand).unwrap();
        assert_eq!(plan.required("lab_technician"), Some(techs));
        assert_eq!(plan.required("engineer"), Some(engineers));
    }

    #[test]
    fn floor_applies_when_demand_is_low() {
        let config = StaffingConfig {
            roles: vec![RoleCapacity::new("optician", 10.0, 3)],
        };
        let plan = StaffingCalculator::new(config).plan_day(day(), 12.0).unwrap();
        assert_eq!(plan.required("optician"), Some(3));
        assert_eq!(plan.total_headcount(), 3);
        assert!(plan.reasoning.contains("3 optician"));
    }

    #[test]
    fn zero_throughput_is_a_validation_error() {
        let config = StaffingConfig {
            roles: vec![RoleCapacity::new("optician", 0.0, 1)],
        };
        assert_matches!(
            StaffingCalculator::new(config).plan_day(day(), 12.0),
            Err(ServiceError::ValidationError(_))
        );
    }

    struct FixedCrew;

    impl StaffingStrategy for FixedCrew {
        fn name(&self) -> &'static str {
            "fixed_crew"
        }

        fn plan(
            &self,
            date: NaiveDate,
            predicted_demand: f64,
            roles: &[RoleCapacity],
        ) -> Result<StaffingPlan, ServiceError> {
            Ok(StaffingPlan {
                date,
                predicted_demand,
                requirements: roles.iter().map(|r| (r.role.clone(), 5)).collect(),
                reasoning: "fixed crew".into(),
            })
        }
    }

    #[test]
    fn strategy_is_swappable() {
        let calculator =
            StaffingCalculator::with_strategy(StaffingConfig::default(), Arc::new(FixedCrew));
        let plan = calculator.plan_day(day(), 1000.0).unwrap();
        assert_eq!(plan.required("engineer"), Some(5));
    }
}
