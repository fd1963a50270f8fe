use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Scope, Severity};

/// Contiguous run of forecast days above the surge threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgePeriod {
    pub scope: Scope,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub peak_value: f64,
    /// `peak_value / baseline`
    pub peak_ratio: f64,
    pub severity: Severity,
}

impl SurgePeriod {
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}
