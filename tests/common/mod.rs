#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use demand_forecasting::models::{Observation, Scope};
use demand_forecasting::repositories::InMemorySeriesRepository;
use demand_forecasting::services::Clock;
use std::sync::Arc;

pub fn day(n: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
}

pub fn generated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 6, 0, 0).unwrap()
}

pub fn fixed_clock() -> Clock {
    let at = generated_at();
    Arc::new(move || at)
}

pub fn tenant(id: &str) -> Scope {
    Scope::tenant(id).unwrap()
}

pub fn product(tenant_id: &str, product_id: &str) -> Scope {
    Scope::product(tenant_id, product_id).unwrap()
}

/// Daily observations starting at `day(offset)`.
pub fn daily(offset: i64, values: &[f64]) -> Vec<Observation> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| Observation::new(day(offset + i as i64), *v))
        .collect()
}

pub fn seed(repo: &InMemorySeriesRepository, scope: &Scope, values: &[f64]) {
    repo.insert_observations(scope, daily(0, values))
        .expect("seed observations");
}

/// Constant history with a single injected value.
pub fn constant_with_spike(len: usize, level: f64, spike_at: usize, spike: f64) -> Vec<f64> {
    let mut values = vec![level; len];
    values[spike_at] = spike;
    values
}
