use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::metrics::{
    ANOMALIES_DETECTED, FORECASTS_SCORED, FORECASTS_WRITTEN, FORECAST_FAILURES, FORECAST_RUNS,
    PATTERN_REFRESHES,
};
use crate::ml::surge::baseline_from_history;
use crate::ml::{
    AccuracyScorer, AnomalyDetector, DemandPredictor, SeasonalPatternDetector, StaffingCalculator,
    StaffingStrategy, SurgeIdentifier,
};
use crate::models::{
    AccuracyMetric, AnomalyReport, DemandSeries, Forecast, ForecastMethod, RealtimeAssessment,
    Scope, SeasonalSnapshot, Sensitivity, StaffingPlan, SurgePeriod,
};
use crate::repositories::SeriesRepository;

/// Source of the current time for generation and scoring timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Forecast request for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub scope: Scope,
    pub horizon_days: u32,
}

impl ForecastRequest {
    pub fn new(scope: Scope, horizon_days: u32) -> Self {
        Self {
            scope,
            horizon_days,
        }
    }
}

/// Everything produced by one forecast generation.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastBundle {
    pub scope: Scope,
    pub method: ForecastMethod,
    pub generated_at: DateTime<Utc>,
    /// One record per horizon day, ascending
    pub forecasts: Vec<Forecast>,
    /// Seasonal snapshot the forecasts were computed with
    pub patterns: SeasonalSnapshot,
    pub staffing: Vec<StaffingPlan>,
    pub surges: Vec<SurgePeriod>,
    /// Recent historical mean the surges were measured against
    pub baseline: Option<f64>,
}

impl ForecastBundle {
    pub fn insufficient_history(&self) -> bool {
        self.forecasts.iter().any(|f| f.insufficient_history)
    }
}

/// A scope that failed inside a batch.
#[derive(Debug)]
pub struct BatchFailure {
    pub scope: Scope,
    pub error: ServiceError,
}

/// Result of a batch: one failing scope never aborts the others.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Ordered by scope
    pub completed: Vec<ForecastBundle>,
    /// Ordered by scope
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// Failures that are faults, leaving out scopes that merely lack history.
    pub fn faults(&self) -> impl Iterator<Item = &BatchFailure> {
        self.failed.iter().filter(|f| f.error.is_fatal())
    }
}

/// Coordinates pattern detection, prediction, staffing, surges, scoring and
/// anomaly detection for scopes backed by a [`SeriesRepository`].
pub struct ForecastService {
    repository: Arc<dyn SeriesRepository>,
    config: EngineConfig,
    detector: SeasonalPatternDetector,
    predictor: DemandPredictor,
    scorer: AccuracyScorer,
    anomalies: AnomalyDetector,
    surges: SurgeIdentifier,
    staffing: StaffingCalculator,
    scope_locks: DashMap<Scope, Arc<Mutex<()>>>,
    clock: Clock,
}

impl std::fmt::Debug for ForecastService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastService")
            .field("method", &self.predictor.method())
            .field("batch_concurrency", &self.config.batch_concurrency)
            .field("locked_scopes", &self.scope_locks.len())
            .finish()
    }
}

impl ForecastService {
    pub fn new(repository: Arc<dyn SeriesRepository>, config: EngineConfig) -> Self {
        Self {
            repository,
            detector: SeasonalPatternDetector::new(config.seasonality.clone()),
            predictor: DemandPredictor::new(config.predictor.clone()),
            scorer: AccuracyScorer::new(config.accuracy.clone()),
            anomalies: AnomalyDetector::new(config.anomaly.clone()),
            surges: SurgeIdentifier::new(config.surge.clone()),
            staffing: StaffingCalculator::new(config.staffing.clone()),
            scope_locks: DashMap::new(),
            clock: Arc::new(Utc::now),
            config,
        }
    }

    /// Swaps the prediction backend.
    pub fn with_predictor(mut self, predictor: DemandPredictor) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_staffing_strategy(mut self, strategy: Arc<dyn StaffingStrategy>) -> Self {
        self.staffing = StaffingCalculator::with_strategy(self.config.staffing.clone(), strategy);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn scope_lock(&self, scope: &Scope) -> Arc<Mutex<()>> {
        self.scope_locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn fetch_history(&self, scope: &Scope) -> Result<DemandSeries, ServiceError> {
        let series = self.repository.fetch_observations(scope).await?;
        if series.is_empty() {
            return Err(ServiceError::NoData(format!(
                "no observations for scope {}",
                scope
            )));
        }
        Ok(series)
    }

    /// Stored snapshot while it is fresh, otherwise a recomputed one that replaces it.
    async fn current_patterns(
        &self,
        series: &DemandSeries,
        now: DateTime<Utc>,
    ) -> Result<SeasonalSnapshot, ServiceError> {
        let scope = series.scope();
        if let Some(snapshot) = self.repository.latest_patterns(scope).await? {
            if !snapshot.is_stale(now, self.config.pattern_refresh_interval()) {
                debug!(scope = %scope, computed_at = %snapshot.computed_at, "reusing seasonal patterns");
                return Ok(snapshot);
            }
        }
        self.recompute_patterns(series, now).await
    }

    async fn recompute_patterns(
        &self,
        series: &DemandSeries,
        now: DateTime<Utc>,
    ) -> Result<SeasonalSnapshot, ServiceError> {
        let snapshot = self.detector.detect(series, now);
        self.repository.replace_patterns(&snapshot).await?;
        PATTERN_REFRESHES.inc();
        debug!(scope = %series.scope(), records = snapshot.records().len(), "seasonal patterns recomputed");
        Ok(snapshot)
    }

    /// Generates and stores a forecast for one scope.
    ///
    /// Unscored records with the same `(scope, date, horizon)` are superseded;
    /// a scored one fails the whole request with `ForecastImmutable`.
    #[instrument(skip(self, request), fields(scope = %request.scope, horizon_days = request.horizon_days))]
    pub async fn generate(&self, request: &ForecastRequest) -> Result<ForecastBundle, ServiceError> {
        FORECAST_RUNS.inc();
        let result = self.generate_inner(request).await;
        if let Err(e) = &result {
            FORECAST_FAILURES.with_label_values(&[e.kind()]).inc();
            if e.is_fatal() {
                warn!(error = %e, "forecast generation failed");
            } else {
                info!(error = %e, "forecast skipped for lack of history");
            }
        }
        result
    }

    async fn generate_inner(&self, request: &ForecastRequest) -> Result<ForecastBundle, ServiceError> {
        let scope = &request.scope;
        scope.ensure_valid()?;
        self.predictor.validate_horizon(request.horizon_days)?;

        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        let series = self.fetch_history(scope).await?;
        let now = self.now();
        let patterns = self.current_patterns(&series, now).await?;

        let forecasts = self
            .predictor
            .predict(&series, Some(&patterns), request.horizon_days, now)?;
        let staffing = self.staffing.plan_forecasts(&forecasts)?;
        let baseline = baseline_from_history(&series, self.surges.baseline_window());
        let surges = baseline
            .map(|b| self.surges.identify(scope, &forecasts, b))
            .unwrap_or_default();

        self.repository.upsert_forecasts(&forecasts).await?;
        FORECASTS_WRITTEN.inc_by(forecasts.len() as u64);

        info!(
            forecasts = forecasts.len(),
            surges = surges.len(),
            history = series.len(),
            "forecast generated"
        );

        Ok(ForecastBundle {
            scope: scope.clone(),
            method: self.predictor.method(),
            generated_at: now,
            forecasts,
            patterns,
            staffing,
            surges,
            baseline,
        })
    }

    /// Generates forecasts for many scopes with at most `batch_concurrency` in flight.
    #[instrument(skip(self, requests), fields(requests = requests.len()))]
    pub async fn generate_batch(&self, requests: Vec<ForecastRequest>) -> BatchOutcome {
        let width = self.config.batch_concurrency.max(1);
        let results: Vec<(Scope, Result<ForecastBundle, ServiceError>)> = stream::iter(requests)
            .map(|request| async move {
                let result = self.generate(&request).await;
                (request.scope, result)
            })
            .buffer_unordered(width)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (scope, result) in results {
            match result {
                Ok(bundle) => outcome.completed.push(bundle),
                Err(error) => outcome.failed.push(BatchFailure { scope, error }),
            }
        }
        outcome.completed.sort_by(|a, b| a.scope.cmp(&b.scope));
        outcome.failed.sort_by(|a, b| a.scope.cmp(&b.scope));

        let faults = outcome.faults().count();
        if faults > 0 {
            warn!(
                completed = outcome.completed.len(),
                failed = outcome.failed.len(),
                faults,
                "forecast batch finished with faults"
            );
        } else {
            info!(
                completed = outcome.completed.len(),
                failed = outcome.failed.len(),
                "forecast batch finished"
            );
        }
        outcome
    }

    /// Forecasts every scope of a tenant that has observations.
    #[instrument(skip(self))]
    pub async fn generate_for_tenant(
        &self,
        tenant_id: &str,
        horizon_days: u32,
    ) -> Result<BatchOutcome, ServiceError> {
        Scope::tenant(tenant_id)?;
        self.predictor.validate_horizon(horizon_days)?;

        let scopes = self.repository.list_scopes(tenant_id).await?;
        let requests = scopes
            .into_iter()
            .map(|scope| ForecastRequest::new(scope, horizon_days))
            .collect();
        Ok(self.generate_batch(requests).await)
    }

    /// Scores every pending forecast whose date now has an observed actual.
    ///
    /// Imputed observations are not actuals and leave their forecasts pending.
    /// Returns the newly scored records.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn score_forecasts(&self, scope: &Scope) -> Result<Vec<Forecast>, ServiceError> {
        scope.ensure_valid()?;
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        let series = self.repository.fetch_observations(scope).await?;
        let (Some(start), Some(end)) = (series.first_date(), series.last_date()) else {
            return Ok(Vec::new());
        };

        let now = self.now();
        let mut scored = Vec::new();
        for mut forecast in self.repository.list_forecasts(scope, start, end).await? {
            if forecast.is_scored() {
                continue;
            }
            let actual = series
                .observations()
                .iter()
                .find(|o| o.date == forecast.forecast_date && !o.imputed)
                .map(|o| o.demand);
            let Some(actual) = actual else {
                continue;
            };

            self.scorer.score(&mut forecast, actual, now)?;
            self.repository.record_score(&forecast).await?;
            FORECASTS_SCORED.inc();
            scored.push(forecast);
        }

        info!(scored = scored.len(), "forecasts scored");
        Ok(scored)
    }

    /// Aggregate accuracy of the scored forecasts dated within `[start, end]`.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn accuracy_report(
        &self,
        scope: &Scope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AccuracyMetric, ServiceError> {
        scope.ensure_valid()?;
        if start > end {
            return Err(ServiceError::InvalidInput(format!(
                "period start {} is after period end {}",
                start, end
            )));
        }

        let forecasts = self.repository.list_forecasts(scope, start, end).await?;
        let metric = self.scorer.aggregate(scope, start, end, &forecasts);
        debug!(sample_size = metric.sample_size, "accuracy report computed");
        Ok(metric)
    }

    /// Runs the three anomaly detectors over the observed history of a scope.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn detect_anomalies(&self, scope: &Scope) -> Result<AnomalyReport, ServiceError> {
        scope.ensure_valid()?;
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        let series = self.fetch_history(scope).await?;
        let patterns = self.current_patterns(&series, self.now()).await?;
        let report = self.anomalies.analyze(&series, Some(&patterns))?;

        for finding in &report.findings {
            let method = finding.method.to_string();
            let severity = finding.severity.to_string();
            ANOMALIES_DETECTED
                .with_label_values(&[&method, &severity])
                .inc();
        }
        info!(
            findings = report.findings.len(),
            high = report.high_severity_count,
            skipped = report.skipped.len(),
            "anomaly detection finished"
        );
        Ok(report)
    }

    /// Scores one incoming value against the scope's recent history without
    /// storing it.
    #[instrument(skip_all, fields(scope = %scope, sensitivity = %sensitivity))]
    pub async fn assess_observation(
        &self,
        scope: &Scope,
        value: f64,
        sensitivity: Sensitivity,
    ) -> Result<RealtimeAssessment, ServiceError> {
        scope.ensure_valid()?;
        let series = self.fetch_history(scope).await?;
        let assessment = self
            .anomalies
            .assess_value(&series.values(), value, sensitivity)?;

        if assessment.is_anomaly {
            let severity = assessment.severity.to_string();
            ANOMALIES_DETECTED
                .with_label_values(&["realtime", severity.as_str()])
                .inc();
            info!(value, severity = %assessment.severity, "incoming value is anomalous");
        }
        Ok(assessment)
    }

    /// Recomputes and replaces the seasonal patterns of a scope regardless of age.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn refresh_patterns(&self, scope: &Scope) -> Result<SeasonalSnapshot, ServiceError> {
        scope.ensure_valid()?;
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        let series = self.fetch_history(scope).await?;
        self.recompute_patterns(&series, self.now()).await
    }
}
