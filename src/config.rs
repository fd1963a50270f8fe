use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "FORECAST";
const DEFAULT_BATCH_CONCURRENCY: usize = 4;
const DEFAULT_PATTERN_REFRESH_HOURS: u64 = 24;

/// Base-level model the predictor runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictorBackend {
    #[default]
    SeasonalMovingAverage,
    ExponentialSmoothing,
    HoltWinters,
}

/// Demand predictor policy
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct PredictorConfig {
    /// Backend fitting the deseasonalised base level
    pub method: PredictorBackend,

    /// Moving-average window `k` (most recent observations used for the base trend)
    #[validate(range(min = 1, max = 365))]
    pub window: usize,

    /// Interval widening per day of lead time: half-width scales by `1 + widening_factor * d`.
    /// A policy constant, tune it against observed interval coverage.
    #[validate(range(min = 0.0, max = 10.0))]
    pub widening_factor: f64,

    /// Multiplier applied to the residual standard deviation for interval half-width
    #[validate(range(min = 0.0, max = 10.0))]
    pub interval_z: f64,

    /// History length at which thin-history confidence damping stops
    #[validate(range(min = 1))]
    pub full_confidence_history: usize,

    /// Below this many observations forecasts are flagged `insufficient_history`
    #[validate(range(min = 1))]
    pub min_history: usize,

    /// Largest accepted horizon
    #[validate(range(min = 1, max = 3660))]
    pub max_horizon_days: u32,

    /// Observations used for the trend label
    #[validate(range(min = 2, max = 365))]
    pub trend_window: usize,

    /// Slope magnitude below which the trend label is `stable`
    #[validate(range(min = 0.0))]
    pub trend_stable_band: f64,

    /// Level smoothing factor for the exponential smoothing and Holt-Winters backends
    #[validate(custom = "validate_unit_interval")]
    pub smoothing_alpha: f64,

    /// Holt-Winters trend smoothing factor
    #[validate(custom = "validate_unit_interval")]
    pub smoothing_beta: f64,

    /// Holt-Winters seasonal smoothing factor
    #[validate(custom = "validate_unit_interval")]
    pub smoothing_gamma: f64,

    /// Holt-Winters cycle length in days
    #[validate(range(min = 1, max = 365))]
    pub season_length: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            method: PredictorBackend::SeasonalMovingAverage,
            window: 14,
            widening_factor: 0.1,
            interval_z: 1.96,
            full_confidence_history: 28,
            min_history: 3,
            max_horizon_days: 365,
            trend_window: 7,
            trend_stable_band: 0.1,
            smoothing_alpha: 0.3,
            smoothing_beta: 0.1,
            smoothing_gamma: 0.1,
            season_length: 7,
        }
    }
}

/// Seasonal decomposition policy
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SeasonalityConfig {
    /// Minimum span, in weeks, before weekly multipliers are reported
    #[validate(range(min = 1, max = 520))]
    pub min_weeks_for_weekly: u32,

    /// Minimum distinct calendar months before monthly multipliers are reported
    #[validate(range(min = 1, max = 240))]
    pub min_months_for_monthly: u32,
}

impl Default for SeasonalityConfig {
    fn default() -> Self {
        Self {
            min_weeks_for_weekly: 8,
            min_months_for_monthly: 12,
        }
    }
}

/// Accuracy scoring policy
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AccuracyConfig {
    /// Relative error counted as "accurate" (0.10 = within 10%)
    #[validate(custom = "validate_unit_interval")]
    pub tolerance: f64,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self { tolerance: 0.10 }
    }
}

/// Anomaly detection policy
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AnomalyConfig {
    /// Trailing window for rolling statistics (the evaluated point is excluded)
    #[validate(range(min = 2, max = 365))]
    pub window: usize,

    /// Fewest trailing samples before a point is evaluated
    #[validate(range(min = 2, max = 365))]
    pub min_samples: usize,

    /// |z| above which a point is a medium-severity outlier
    #[validate(range(min = 0.0))]
    pub z_medium: f64,

    /// |z| above which a point is a high-severity outlier
    #[validate(range(min = 0.0))]
    pub z_high: f64,

    /// Tukey fence multiplier applied to the trailing interquartile range
    #[validate(range(min = 0.0))]
    pub iqr_multiplier: f64,

    /// Relative deviation from the seasonal expectation that is flagged
    #[validate(range(min = 0.0))]
    pub seasonal_threshold: f64,

    /// Relative deviation at which seasonal findings become medium severity
    #[validate(range(min = 0.0))]
    pub seasonal_medium_deviation: f64,

    /// Relative deviation at which seasonal findings become high severity
    #[validate(range(min = 0.0))]
    pub seasonal_high_deviation: f64,

    /// Length of each of the two adjacent slope windows
    #[validate(range(min = 2, max = 365))]
    pub trend_window: usize,

    /// Relative slope change that is flagged (0.5 = 50%)
    #[validate(range(min = 0.0))]
    pub trend_change_threshold: f64,

    /// Slopes below this fraction of the mean level count as flat
    #[validate(range(min = 0.0))]
    pub trend_flat_slope_ratio: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window: 14,
            min_samples: 7,
            z_medium: 2.0,
            z_high: 3.0,
            iqr_multiplier: 1.5,
            seasonal_threshold: 0.30,
            seasonal_medium_deviation: 0.60,
            seasonal_high_deviation: 1.0,
            trend_window: 7,
            trend_change_threshold: 0.5,
            trend_flat_slope_ratio: 0.01,
        }
    }
}

/// Surge identification policy
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SurgeConfig {
    /// Days above `baseline * threshold_multiplier` are surge days
    #[validate(range(min = 1.0))]
    pub threshold_multiplier: f64,

    /// Peak ratio at which a surge becomes medium severity
    #[validate(range(min = 1.0))]
    pub medium_multiplier: f64,

    /// Peak ratio at which a surge becomes high severity
    #[validate(range(min = 1.0))]
    pub high_multiplier: f64,

    /// Recent observations averaged into the surge baseline
    #[validate(range(min = 1, max = 3660))]
    pub baseline_window: usize,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            threshold_multiplier: 1.5,
            medium_multiplier: 2.0,
            high_multiplier: 3.0,
            baseline_window: 28,
        }
    }
}

/// Throughput and floor for one staffed role
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoleCapacity {
    pub role: String,
    pub units_per_worker_per_day: f64,
    #[serde(default)]
    pub minimum_staff: u32,
}

impl RoleCapacity {
    pub fn new(role: impl Into<String>, units_per_worker_per_day: f64, minimum_staff: u32) -> Self {
        Self {
            role: role.into(),
            units_per_worker_per_day,
            minimum_staff,
        }
    }
}

/// Staffing translation policy
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct StaffingConfig {
    #[validate(length(min = 1))]
    pub roles: Vec<RoleCapacity>,
}

impl Default for StaffingConfig {
    fn default() -> Self {
        Self {
            roles: vec![
                RoleCapacity::new("lab_technician", 15.0, 1),
                RoleCapacity::new("engineer", 25.0, 1),
            ],
        }
    }
}

/// Engine configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Database connection URL for the sea-orm repository adapter
    #[serde(default)]
    pub database_url: Option<String>,

    /// Scopes forecast concurrently by batch entry points
    #[serde(default = "default_batch_concurrency")]
    #[validate(range(min = 1, max = 256))]
    pub batch_concurrency: usize,

    /// Age after which a stored seasonal snapshot is recomputed
    #[serde(default = "default_pattern_refresh_hours")]
    pub pattern_refresh_hours: u64,

    #[serde(default)]
    #[validate]
    pub predictor: PredictorConfig,

    #[serde(default)]
    #[validate]
    pub seasonality: SeasonalityConfig,

    #[serde(default)]
    #[validate]
    pub accuracy: AccuracyConfig,

    #[serde(default)]
    #[validate]
    pub anomaly: AnomalyConfig,

    #[serde(default)]
    #[validate]
    pub surge: SurgeConfig,

    #[serde(default)]
    #[validate]
    pub staffing: StaffingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            database_url: None,
            batch_concurrency: default_batch_concurrency(),
            pattern_refresh_hours: default_pattern_refresh_hours(),
            predictor: PredictorConfig::default(),
            seasonality: SeasonalityConfig::default(),
            accuracy: AccuracyConfig::default(),
            anomaly: AnomalyConfig::default(),
            surge: SurgeConfig::default(),
            staffing: StaffingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Gets pattern refresh interval as a chrono duration
    pub fn pattern_refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pattern_refresh_hours.min(i64::MAX as u64) as i64)
    }

    /// Runs derive-based validation plus the cross-field constraints.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.validate_additional_constraints()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.anomaly.z_high < self.anomaly.z_medium {
            let mut err = ValidationError::new("z_threshold_order");
            err.message = Some("anomaly.z_high must be >= anomaly.z_medium".into());
            errors.add("anomaly", err);
        }

        if self.anomaly.seasonal_medium_deviation < self.anomaly.seasonal_threshold
            || self.anomaly.seasonal_high_deviation < self.anomaly.seasonal_medium_deviation
        {
            let mut err = ValidationError::new("seasonal_band_order");
            err.message = Some(
                "anomaly seasonal bands must satisfy threshold <= medium <= high".into(),
            );
            errors.add("anomaly", err);
        }

        if self.surge.medium_multiplier < self.surge.threshold_multiplier
            || self.surge.high_multiplier < self.surge.medium_multiplier
        {
            let mut err = ValidationError::new("surge_band_order");
            err.message =
                Some("surge bands must satisfy threshold <= medium <= high".into());
            errors.add("surge", err);
        }

        if self.predictor.min_history > self.predictor.window {
            let mut err = ValidationError::new("min_history_exceeds_window");
            err.message = Some("predictor.min_history must not exceed predictor.window".into());
            errors.add("predictor", err);
        }

        let mut seen = HashSet::new();
        for role in &self.staffing.roles {
            if role.role.trim().is_empty() {
                let mut err = ValidationError::new("role_name");
                err.message = Some("staffing role names must not be empty".into());
                errors.add("staffing", err);
            }
            if !role.units_per_worker_per_day.is_finite() || role.units_per_worker_per_day <= 0.0
            {
                let mut err = ValidationError::new("role_throughput");
                err.message = Some(
                    format!(
                        "staffing role '{}' must have a positive units_per_worker_per_day",
                        role.role
                    )
                    .into(),
                );
                errors.add("staffing", err);
            }
            if !seen.insert(role.role.as_str()) {
                let mut err = ValidationError::new("role_duplicate");
                err.message = Some(format!("staffing role '{}' is listed twice", role.role).into());
                errors.add("staffing", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl From<EngineConfigError> for crate::errors::ServiceError {
    fn from(err: EngineConfigError) -> Self {
        crate::errors::ServiceError::ConfigError(err.to_string())
    }
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

fn default_pattern_refresh_hours() -> u64 {
    DEFAULT_PATTERN_REFRESH_HOURS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_unit_interval(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        let mut err = ValidationError::new("unit_interval");
        err.message = Some("must be a finite value in (0.0, 1.0]".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("demand_forecasting={},sea_orm=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads engine configuration from the `config/` directory of the working directory.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (FORECAST__*, e.g. `FORECAST__ANOMALY__Z_HIGH=3.5`)
pub fn load_config() -> Result<EngineConfig, EngineConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit configuration directory.
pub fn load_config_from(config_dir: &Path) -> Result<EngineConfig, EngineConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading forecasting configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(
            File::with_name(&config_dir.join("default").to_string_lossy()).required(false),
        )
        .add_source(File::with_name(&config_dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let engine_config: EngineConfig = config.try_deserialize()?;

    engine_config.validate_all().map_err(|e| {
        error!("Forecasting configuration validation failed: {:?}", e);
        EngineConfigError::Validation(e)
    })?;

    info!("Forecasting configuration loaded successfully");
    Ok(engine_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate_all().is_ok());
        assert_eq!(cfg.predictor.window, 14);
        assert_eq!(cfg.accuracy.tolerance, 0.10);
        assert_eq!(cfg.anomaly.z_medium, 2.0);
        assert_eq!(cfg.anomaly.z_high, 3.0);
        assert_eq!(cfg.surge.threshold_multiplier, 1.5);
        assert_eq!(cfg.staffing.roles.len(), 2);
    }

    #[test]
    fn inverted_z_thresholds_are_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.anomaly.z_high = 1.5;
        let errors = cfg.validate_all().unwrap_err();
        assert!(errors.errors().contains_key("anomaly"));
    }

    #[test]
    fn non_positive_throughput_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.staffing.roles = vec![RoleCapacity::new("optician", 0.0, 1)];
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn duplicate_roles_are_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.staffing.roles = vec![
            RoleCapacity::new("optician", 10.0, 1),
            RoleCapacity::new("optician", 12.0, 2),
        ];
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn tolerance_outside_unit_interval_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.accuracy.tolerance = 1.5;
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn load_config_reads_partial_sections_from_file() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
                batch_concurrency = 8

                [predictor]
                window = 21
                widening_factor = 0.2

                [surge]
                threshold_multiplier = 1.25

                [[staffing.roles]]
                role = "optician"
                units_per_worker_per_day = 12.0
                minimum_staff = 2
            "#,
        );

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.batch_concurrency, 8);
        assert_eq!(cfg.predictor.window, 21);
        assert_eq!(cfg.predictor.widening_factor, 0.2);
        // Untouched fields in a partially specified section keep their defaults
        assert_eq!(cfg.predictor.interval_z, 1.96);
        assert_eq!(cfg.surge.threshold_multiplier, 1.25);
        assert_eq!(cfg.surge.high_multiplier, 3.0);
        assert_eq!(
            cfg.staffing.roles,
            vec![RoleCapacity::new("optician", 12.0, 2)]
        );
    }

    #[test]
    fn load_config_selects_the_predictor_backend() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
                [predictor]
                method = "holt_winters"
                smoothing_alpha = 0.5
                season_length = 14
            "#,
        );

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.predictor.method, PredictorBackend::HoltWinters);
        assert_eq!(cfg.predictor.smoothing_alpha, 0.5);
        assert_eq!(cfg.predictor.smoothing_beta, 0.1);
        assert_eq!(cfg.predictor.season_length, 14);

        write_config(
            &dir,
            "default.toml",
            r#"
                [predictor]
                method = "arima"
            "#,
        );
        assert!(matches!(
            load_config_from(dir.path()),
            Err(EngineConfigError::Load(_))
        ));
    }

    #[test]
    fn load_config_rejects_invalid_policy() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
                [anomaly]
                z_medium = 4.0
                z_high = 3.0
            "#,
        );

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(EngineConfigError::Validation(_))));
    }

    #[test]
    fn load_config_without_directory_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_from(&dir.path().join("missing")).unwrap();
        assert_eq!(cfg.predictor.window, 14);
        assert_eq!(cfg.batch_concurrency, DEFAULT_BATCH_CONCURRENCY);
    }
}
