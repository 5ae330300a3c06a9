//! PostgreSQL access: connection pool, schema migrations and repositories.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

pub mod events;
pub mod migrations;
pub mod users;

pub use events::{EventRepository, InMemoryEventRepository, PgEventRepository};
pub use migrations::{Migration, MigrationError, MigrationReport, MigrationStatus, Migrator};
pub use users::{InMemoryUserRepository, PgUserRepository, UserRepository};

pub const MAX_CONNECTIONS: u32 = 25;
pub const MIN_CONNECTIONS: u32 = 5;
pub const MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No row matched the given identifier.
    #[error("record not found")]
    NotFound,

    /// A unique constraint rejected the write.
    #[error("conflict on {0}")]
    Conflict(String),

    #[error("failed to {op}: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl RepositoryError {
    /// Wraps a driver error with the name of the operation that produced it.
    pub(crate) fn database(op: &'static str) -> impl Fn(sqlx::Error) -> Self {
        move |source| {
            if let sqlx::Error::Database(db) = &source {
                if db.is_unique_violation() {
                    let constraint = db.constraint().unwrap_or("unique constraint");
                    return RepositoryError::Conflict(constraint.to_string());
                }
            }
            RepositoryError::Database { op, source }
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, sqlx::Error> {
    if let Some(url) = &config.url {
        return PgConnectOptions::from_str(url);
    }

    let ssl_mode = PgSslMode::from_str(&config.ssl_mode)?;
    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .ssl_mode(ssl_mode))
}

/// Opens the shared pool and verifies it with a round trip before returning.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        user = %config.user,
        "Connecting to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(MIN_CONNECTIONS)
        .max_lifetime(MAX_LIFETIME)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(connect_options(config)?)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    info!(max_connections = MAX_CONNECTIONS, "Successfully connected to database");
    Ok(pool)
}
