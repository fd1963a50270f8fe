use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Headcount per role for one forecast day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffingPlan {
    pub date: NaiveDate,
    pub predicted_demand: f64,
    pub requirements: BTreeMap<String, u32>,
    pub reasoning: String,
}

impl StaffingPlan {
    pub fn required(&self, role: &str) -> Option<u32> {
        self.requirements.get(role).copied()
    }

    pub fn total_headcount(&self) -> u32 {
        self.requirements.values().sum()
    }
}
