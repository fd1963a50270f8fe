use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::models::Scope;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnomalyMethod {
    Statistical,
    Seasonal,
    Trend,
}

/// Ordered `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// How readily a single incoming value is flagged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Standard deviations a value may stray from the recent mean before it is flagged.
    pub fn threshold_multiplier(self) -> f64 {
        match self {
            Sensitivity::Low => 3.0,
            Sensitivity::Medium => 2.0,
            Sensitivity::High => 1.5,
        }
    }
}

/// Verdict on one incoming value against the recent history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeAssessment {
    pub value: f64,
    pub is_anomaly: bool,
    pub severity: Severity,
    /// Distance from the mean relative to the sensitivity threshold, capped at 1
    pub confidence: f64,
    pub expected_range: (f64, f64),
    /// Recent observations the verdict was based on
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    pub scope: Scope,
    pub date: NaiveDate,
    pub method: AnomalyMethod,
    pub observed_value: f64,
    /// `(low, high)` range the observation was expected to fall in
    pub expected_range: (f64, f64),
    pub severity: Severity,
    pub description: String,
}

impl AnomalyFinding {
    pub fn expected_midpoint(&self) -> f64 {
        (self.expected_range.0 + self.expected_range.1) / 2.0
    }

    /// Relative distance of the observation from the middle of the expected range.
    pub fn relative_deviation(&self) -> f64 {
        let expected = self.expected_midpoint();
        (self.observed_value - expected).abs() / expected.abs().max(1.0)
    }
}

/// A detector that did not run, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDetector {
    pub method: AnomalyMethod,
    pub reason: String,
}

/// Combined output of the three detectors over one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub scope: Scope,
    pub observations_analyzed: usize,
    /// Ordered by date, then method
    pub findings: Vec<AnomalyFinding>,
    pub counts_by_method: BTreeMap<AnomalyMethod, usize>,
    pub high_severity_count: usize,
    pub mean_relative_deviation: Option<f64>,
    pub skipped: Vec<SkippedDetector>,
}

impl AnomalyReport {
    pub fn new(
        scope: Scope,
        observations_analyzed: usize,
        mut findings: Vec<AnomalyFinding>,
        skipped: Vec<SkippedDetector>,
    ) -> Self {
        findings.sort_by(|a, b| a.date.cmp(&b.date).then(a.method.cmp(&b.method)));

        let mut counts_by_method = BTreeMap::new();
        for finding in &findings {
            *counts_by_method.entry(finding.method).or_insert(0) += 1;
        }
        let high_severity_count = findings
            .iter()
            .filter(|f| f.severity == Severity::High)
            .count();
        let mean_relative_deviation = if findings.is_empty() {
            None
        } else {
            Some(
                findings.iter().map(AnomalyFinding::relative_deviation).sum::<f64>()
                    / findings.len() as f64,
            )
        };

        Self {
            scope,
            observations_analyzed,
            findings,
            counts_by_method,
            high_severity_count,
            mean_relative_deviation,
            skipped,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings_on(&self, date: NaiveDate) -> impl Iterator<Item = &AnomalyFinding> {
        self.findings.iter().filter(move |f| f.date == date)
    }

    pub fn count(&self, method: AnomalyMethod) -> usize {
        self.counts_by_method.get(&method).copied().unwrap_or(0)
    }
}
