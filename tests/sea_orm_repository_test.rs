mod common;

use assert_matches::assert_matches;
use common::*;
use demand_forecasting::config::EngineConfig;
use demand_forecasting::db::{self, DbConfig};
use demand_forecasting::errors::ServiceError;
use demand_forecasting::ml::{AccuracyScorer, SeasonalPatternDetector};
use demand_forecasting::models::{Observation, Scope};
use demand_forecasting::repositories::{SeaOrmSeriesRepository, SeriesRepository};
use demand_forecasting::services::{ForecastRequest, ForecastService};
use std::sync::Arc;

async fn repository() -> SeaOrmSeriesRepository {
    // A single connection keeps every query on the same in-memory database
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&config)
        .await
        .expect("db connect");
    db::run_migrations(&pool).await.expect("migrations");
    SeaOrmSeriesRepository::new(Arc::new(pool))
}

#[tokio::test]
async fn observations_round_trip_in_date_order() {
    let repo = repository().await;
    let scope = product("acme", "widget");

    let mut observations = daily(0, &[5.0, 6.0, 7.0]);
    observations.reverse();
    repo.record_observations(&scope, &observations).await.unwrap();
    // Same date again overwrites
    repo.record_observations(&scope, &[Observation::new(day(1), 9.0)])
        .await
        .unwrap();

    let series = repo.fetch_observations(&scope).await.unwrap();
    assert_eq!(series.values(), vec![5.0, 9.0, 7.0]);
    assert_eq!(series.first_date(), Some(day(0)));

    let other = repo.fetch_observations(&tenant("acme")).await.unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn negative_observations_are_rejected() {
    let repo = repository().await;
    let result = repo
        .record_observations(&tenant("acme"), &[Observation::new(day(0), -1.0)])
        .await;
    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn scopes_are_listed_company_wide_first() {
    let repo = repository().await;
    repo.record_observations(&product("acme", "widget"), &daily(0, &[1.0]))
        .await
        .unwrap();
    repo.record_observations(&tenant("acme"), &daily(0, &[1.0, 2.0]))
        .await
        .unwrap();
    repo.record_observations(&tenant("globex"), &daily(0, &[1.0]))
        .await
        .unwrap();

    let scopes = repo.list_scopes("acme").await.unwrap();
    assert_eq!(scopes, vec![tenant("acme"), product("acme", "widget")]);
}

#[tokio::test]
async fn pattern_snapshots_are_replaced_wholesale() {
    let repo = repository().await;
    let scope = tenant("acme");
    let values: Vec<f64> = (0..70).map(|i| if i % 7 >= 5 { 50.0 } else { 100.0 }).collect();
    let series = demand_forecasting::models::DemandSeries::from_daily_values(
        scope.clone(),
        day(0),
        &values,
    )
    .unwrap();

    assert!(repo.latest_patterns(&scope).await.unwrap().is_none());

    let snapshot = SeasonalPatternDetector::default().detect(&series, generated_at());
    repo.replace_patterns(&snapshot).await.unwrap();
    repo.replace_patterns(&snapshot).await.unwrap();

    let stored = repo.latest_patterns(&scope).await.unwrap().unwrap();
    assert_eq!(stored.records().len(), snapshot.records().len());
    assert_eq!(stored.weekly, snapshot.weekly);
    assert_eq!(stored.computed_at, snapshot.computed_at);
}

#[tokio::test]
async fn forecast_lifecycle_through_the_service() {
    let repo = Arc::new(repository().await);
    let scope = tenant("acme");
    repo.record_observations(&scope, &daily(0, &[50.0; 30]))
        .await
        .unwrap();

    let svc = ForecastService::new(repo.clone(), EngineConfig::default()).with_clock(fixed_clock());
    let request = ForecastRequest::new(scope.clone(), 7);
    svc.generate(&request).await.unwrap();
    svc.generate(&request).await.unwrap();

    let stored = repo.list_forecasts(&scope, day(30), day(36)).await.unwrap();
    assert_eq!(stored.len(), 7);

    repo.record_observations(&scope, &[Observation::new(day(30), 45.0)])
        .await
        .unwrap();
    let scored = svc.score_forecasts(&scope).await.unwrap();
    assert_eq!(scored.len(), 1);
    assert!((scored[0].accuracy_score.unwrap() - (1.0 - 5.0 / 45.0)).abs() < 1e-9);

    // Direct rescoring of the stored record is refused
    let mut again = repo
        .find_forecast(&scored[0].key())
        .await
        .unwrap()
        .unwrap();
    assert!(AccuracyScorer::default()
        .score(&mut again, 10.0, generated_at())
        .is_err());
    let mut forged = stored[0].clone();
    forged.observed_actual = Some(10.0);
    forged.accuracy_score = Some(0.0);
    assert_matches!(
        repo.record_score(&forged).await,
        Err(ServiceError::ForecastImmutable { .. })
    );

    let metric = svc.accuracy_report(&scope, day(30), day(36)).await.unwrap();
    assert_eq!(metric.sample_size, 1);
}

#[tokio::test]
async fn upsert_refuses_to_overwrite_a_scored_forecast() {
    let repo = Arc::new(repository().await);
    let scope: Scope = tenant("acme");
    repo.record_observations(&scope, &daily(0, &[50.0; 30]))
        .await
        .unwrap();
    let svc = ForecastService::new(repo.clone(), EngineConfig::default()).with_clock(fixed_clock());
    let request = ForecastRequest::new(scope.clone(), 3);

    let bundle = svc.generate(&request).await.unwrap();
    let mut first = bundle.forecasts[0].clone();
    AccuracyScorer::default()
        .score(&mut first, 50.0, generated_at())
        .unwrap();
    repo.record_score(&first).await.unwrap();

    assert_matches!(
        svc.generate(&request).await,
        Err(ServiceError::ForecastImmutable { .. })
    );
    let stored = repo.list_forecasts(&scope, day(30), day(32)).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.iter().filter(|f| f.is_scored()).count(), 1);
}
