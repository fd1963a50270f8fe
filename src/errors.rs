use chrono::NaiveDate;
use sea_orm::error::DbErr;
use serde::Serialize;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Insufficient history: {required} observations required, {available} available")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Forecast immutable: forecast for {scope} on {forecast_date} (horizon {horizon_days}) is already scored")]
    ForecastImmutable {
        scope: String,
        forecast_date: NaiveDate,
        horizon_days: u32,
    },

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Invalid horizon: {0}")]
    InvalidHorizon(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Whether the error is a fault rather than a data shortfall.
    ///
    /// `NoData` and `InsufficientHistory` only mean the scope has too little
    /// history yet; batch runs report them without counting them as faults.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NoData(_) | Self::InsufficientHistory { .. })
    }

    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database",
            Self::NoData(_) => "no_data",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::ForecastImmutable { .. } => "forecast_immutable",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidHorizon(_) => "invalid_horizon",
            Self::ValidationError(_) => "validation",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::ConfigError(_) => "config",
            Self::InternalError(_) => "internal",
            Self::Other(_) => "other",
        }
    }
}

// Result extensions for easier error handling
pub trait ResultExt<T> {
    fn map_err_to_service(self) -> Result<T, ServiceError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn map_err_to_service(self) -> Result<T, ServiceError> {
        self.map_err(|e| e.into())
    }
}
