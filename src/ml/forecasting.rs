/*!
 * # Demand Forecasting
 *
 * Multi-day-ahead demand prediction with confidence intervals.
 *
 * The predictor removes the seasonal component from history using an explicit
 * [`SeasonalSnapshot`], asks a [`DemandModel`] for the base level, its daily
 * drift and its residual spread, then re-applies the multipliers for each
 * future day. The backend is chosen by [`PredictorConfig::method`]. Interval
 * width grows by `1 + widening_factor * d` with lead time `d`; that factor is a
 * tunable policy constant in [`PredictorConfig`], not a physical law.
 */

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::config::{PredictorBackend, PredictorConfig};
use crate::errors::ServiceError;
use crate::ml::statistics;
use crate::models::{
    DemandSeries, Forecast, ForecastMethod, ForecastPoint, SeasonalSnapshot, TrendDirection,
};

/// Base level fitted to deseasonalised history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseFit {
    pub level: f64,
    /// Change of the level per day ahead; zero for level-only backends
    pub trend: f64,
    /// Spread of the fitted level against the actuals it was fit on
    pub residual_std: f64,
}

/// A prediction backend.
///
/// Backends only estimate the deseasonalised base level; seasonality, intervals
/// and confidence are applied uniformly by [`DemandPredictor`], so downstream
/// consumers never depend on which backend ran.
pub trait DemandModel: Send + Sync {
    fn method(&self) -> ForecastMethod;

    /// Fits the base level to a non-empty, date-ordered history.
    fn fit(&self, history: &[f64]) -> Option<BaseFit>;
}

/// Linear-decay weighted moving average over the last `window` points.
#[derive(Debug, Clone)]
pub struct SeasonalMovingAverage {
    window: usize,
}

impl SeasonalMovingAverage {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl DemandModel for SeasonalMovingAverage {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::SeasonalMovingAverage
    }

    fn fit(&self, history: &[f64]) -> Option<BaseFit> {
        let start = history.len().saturating_sub(self.window);
        let recent = &history[start..];
        // Cold start: plain mean of whatever history exists
        let level = if history.len() < self.window {
            statistics::mean(recent)?
        } else {
            statistics::linear_decay_weighted_mean(recent)?
        };
        let residual_std =
            (recent.iter().map(|v| (v - level).powi(2)).sum::<f64>() / recent.len() as f64).sqrt();
        Some(BaseFit {
            level,
            trend: 0.0,
            residual_std,
        })
    }
}

/// Simple exponential smoothing; the residual is the one-step-ahead error.
#[derive(Debug, Clone)]
pub struct ExponentialSmoothing {
    alpha: f64,
}

impl ExponentialSmoothing {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
        }
    }
}

impl DemandModel for ExponentialSmoothing {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::ExponentialSmoothing
    }

    fn fit(&self, history: &[f64]) -> Option<BaseFit> {
        let (first, rest) = history.split_first()?;
        let mut level = *first;
        let mut squared_errors = 0.0;
        for value in rest {
            squared_errors += (value - level).powi(2);
            level = self.alpha * value + (1.0 - self.alpha) * level;
        }
        let residual_std = if rest.is_empty() {
            0.0
        } else {
            (squared_errors / rest.len() as f64).sqrt()
        };
        Some(BaseFit {
            level,
            trend: 0.0,
            residual_std,
        })
    }
}

/// Levels and indices below this are treated as zero.
const FLAT_LEVEL: f64 = 1e-9;

/// Triple exponential smoothing over level, trend and a `season_length` cycle.
///
/// The cycle indices only clean the level and trend estimates; forecasts carry
/// the snapshot's multipliers like every other backend. Fewer than two full
/// cycles fall back to simple exponential smoothing.
#[derive(Debug, Clone)]
pub struct HoltWinters {
    alpha: f64,
    beta: f64,
    gamma: f64,
    season_length: usize,
}

impl HoltWinters {
    pub fn new(alpha: f64, beta: f64, gamma: f64, season_length: usize) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            beta: beta.clamp(0.0, 1.0),
            gamma: gamma.clamp(0.0, 1.0),
            season_length: season_length.max(1),
        }
    }

    /// Cycle indices from the first two cycles, each detrended around its own mean.
    fn initial_indices(&self, history: &[f64], cycle_means: (f64, f64), trend: f64) -> Vec<f64> {
        let m = self.season_length;
        let centre = (m as f64 - 1.0) / 2.0;
        (0..m)
            .map(|i| {
                let offset = trend * (i as f64 - centre);
                let pairs = [(history[i], cycle_means.0), (history[i + m], cycle_means.1)];
                let ratios: Vec<f64> = pairs
                    .iter()
                    .filter(|(_, mean)| mean + offset > FLAT_LEVEL)
                    .map(|(value, mean)| value / (mean + offset))
                    .collect();
                statistics::mean(&ratios).unwrap_or(1.0)
            })
            .collect()
    }
}

impl DemandModel for HoltWinters {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::HoltWinters
    }

    fn fit(&self, history: &[f64]) -> Option<BaseFit> {
        let m = self.season_length;
        if history.len() < 2 * m {
            return ExponentialSmoothing::new(self.alpha).fit(history);
        }

        let first = statistics::mean(&history[..m])?;
        let second = statistics::mean(&history[m..2 * m])?;
        let mut trend = (second - first) / m as f64;
        let mut indices = self.initial_indices(history, (first, second), trend);
        // Level as of the last point of the second cycle
        let mut level = second + trend * (m as f64 - 1.0) / 2.0;

        let mut squared_errors = 0.0;
        for (t, value) in history.iter().enumerate().skip(2 * m) {
            let slot = t % m;
            let index = if indices[slot] > FLAT_LEVEL {
                indices[slot]
            } else {
                1.0
            };
            squared_errors += (value - (level + trend) * index).powi(2);

            let previous = level;
            level = self.alpha * (value / index) + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - previous) + (1.0 - self.beta) * trend;
            if level.abs() > FLAT_LEVEL {
                indices[slot] = self.gamma * (value / level) + (1.0 - self.gamma) * index;
            }
        }

        let steps = history.len() - 2 * m;
        let residual_std = if steps == 0 {
            0.0
        } else {
            (squared_errors / steps as f64).sqrt()
        };
        Some(BaseFit {
            level,
            trend,
            residual_std,
        })
    }
}

/// Labels the direction of the last observations by their OLS slope.
pub fn trend_direction(values: &[f64], window: usize, stable_band: f64) -> TrendDirection {
    let start = values.len().saturating_sub(window);
    match statistics::slope(&values[start..]) {
        Some(slope) if slope > stable_band => TrendDirection::Increasing,
        Some(slope) if slope < -stable_band => TrendDirection::Decreasing,
        _ => TrendDirection::Stable,
    }
}

/// Produces horizon-long forecast series from history and a seasonal snapshot.
#[derive(Clone)]
pub struct DemandPredictor {
    config: PredictorConfig,
    model: Arc<dyn DemandModel>,
}

impl std::fmt::Debug for DemandPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemandPredictor")
            .field("config", &self.config)
            .field("method", &self.model.method())
            .finish()
    }
}

impl DemandPredictor {
    /// Predictor backed by the model named in `config.method`.
    pub fn new(config: PredictorConfig) -> Self {
        let model: Arc<dyn DemandModel> = match config.method {
            PredictorBackend::SeasonalMovingAverage => {
                Arc::new(SeasonalMovingAverage::new(config.window))
            }
            PredictorBackend::ExponentialSmoothing => {
                Arc::new(ExponentialSmoothing::new(config.smoothing_alpha))
            }
            PredictorBackend::HoltWinters => Arc::new(HoltWinters::new(
                config.smoothing_alpha,
                config.smoothing_beta,
                config.smoothing_gamma,
                config.season_length,
            )),
        };
        Self { config, model }
    }

    /// Predictor backed by any [`DemandModel`].
    pub fn with_model(config: PredictorConfig, model: Arc<dyn DemandModel>) -> Self {
        Self { config, model }
    }

    pub fn method(&self) -> ForecastMethod {
        self.model.method()
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Rejects a horizon outside `1..=max_horizon_days`.
    pub fn validate_horizon(&self, horizon_days: u32) -> Result<(), ServiceError> {
        if horizon_days == 0 || horizon_days > self.config.max_horizon_days {
            return Err(ServiceError::InvalidHorizon(format!(
                "horizon must be between 1 and {} days, got {}",
                self.config.max_horizon_days, horizon_days
            )));
        }
        Ok(())
    }

    /// Forecasts `horizon_days` days after the last observation.
    ///
    /// Fewer than `min_history` observations still produce a forecast, with
    /// confidence 0 and the `insufficient_history` marker set. An empty series
    /// is `NoData`.
    pub fn predict(
        &self,
        series: &DemandSeries,
        snapshot: Option<&SeasonalSnapshot>,
        horizon_days: u32,
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<Forecast>, ServiceError> {
        self.validate_horizon(horizon_days)?;
        let last_date = series.last_date().ok_or_else(|| {
            ServiceError::NoData(format!("no observations for scope {}", series.scope()))
        })?;

        let multiplier = |date: NaiveDate| snapshot.map_or(1.0, |s| s.combined_multiplier(date));
        let deseasonalised: Vec<f64> = series
            .observations()
            .iter()
            .map(|o| o.demand / multiplier(o.date))
            .collect();

        let insufficient_history = series.len() < self.config.min_history;
        let fit = if insufficient_history {
            warn!(
                scope = %series.scope(),
                available = series.len(),
                required = self.config.min_history,
                "insufficient history, forecasting with zero confidence"
            );
            BaseFit {
                level: statistics::mean(&deseasonalised).unwrap_or(0.0),
                trend: 0.0,
                residual_std: statistics::std_dev(&deseasonalised).unwrap_or(0.0),
            }
        } else {
            self.model.fit(&deseasonalised).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "{} backend produced no fit for scope {}",
                    self.model.method(),
                    series.scope()
                ))
            })?
        };

        let history_factor =
            (series.len() as f64 / self.config.full_confidence_history as f64).min(1.0);
        let consistency = 1.0 / (1.0 + fit.residual_std / fit.level.max(1.0));
        let trend = trend_direction(
            &series.values(),
            self.config.trend_window,
            self.config.trend_stable_band,
        );
        let method = self.model.method();

        let forecasts = (1..=horizon_days)
            .map(|d| {
                let forecast_date = last_date + Duration::days(i64::from(d));
                let m = multiplier(forecast_date);
                let spread = 1.0 + self.config.widening_factor * f64::from(d);
                let predicted = ((fit.level + fit.trend * f64::from(d)) * m).max(0.0);
                let half_width = self.config.interval_z * fit.residual_std * m * spread;
                let confidence = if insufficient_history {
                    0.0
                } else {
                    (history_factor * consistency / spread).clamp(0.0, 1.0)
                };

                Forecast::pending(
                    series.scope().clone(),
                    ForecastPoint {
                        forecast_date,
                        lead_days: d,
                        predicted_demand: predicted,
                        confidence_lower: (predicted - half_width).max(0.0),
                        confidence_upper: predicted + half_width,
                        confidence_score: confidence,
                    },
                    horizon_days,
                    method.clone(),
                    trend,
                    insufficient_history,
                    generated_at,
                )
            })
            .collect();

        Ok(forecasts)
    }
}
