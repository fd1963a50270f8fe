use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::migrator::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl TryFrom<&EngineConfig> for DbConfig {
    type Error = ServiceError;

    fn try_from(cfg: &EngineConfig) -> Result<Self, Self::Error> {
        let url = cfg
            .database_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ServiceError::ConfigError("database_url is not configured".into()))?;
        Ok(Self {
            url,
            ..Default::default()
        })
    }
}

/// Establishes a connection pool to the database
///
/// # Errors
/// Returns a `DatabaseError` if the connection cannot be established
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection failed: {}", e);
        ServiceError::db_error(e)
    })?;

    info!("Database connection pool established successfully");

    Ok(db_pool)
}

/// Connects using the `database_url` of the engine configuration
pub async fn establish_connection_from_config(cfg: &EngineConfig) -> Result<DbPool, ServiceError> {
    let db_cfg = DbConfig::try_from(cfg)?;
    establish_connection_with_config(&db_cfg).await
}

/// Applies every pending forecasting migration
pub async fn run_migrations(db: &DbPool) -> Result<(), ServiceError> {
    info!("Running forecasting migrations");

    match Migrator::up(db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(ServiceError::db_error(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn missing_database_url_is_a_config_error() {
        let cfg = EngineConfig::default();
        assert_matches!(DbConfig::try_from(&cfg), Err(ServiceError::ConfigError(_)));
    }

    #[tokio::test]
    async fn migrations_apply_to_in_memory_sqlite() {
        let config = DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        };
        let db = establish_connection_with_config(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        // Idempotent
        run_migrations(&db).await.unwrap();
    }
}
