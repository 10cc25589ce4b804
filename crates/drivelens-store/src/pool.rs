//! Database connection pool management
//!
//! Wraps sqlx's PgPool with connection configuration and automatic schema
//! migration on first connection.

use std::time::Duration;

use drivelens_core::ports::store::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Manages a pool of Postgres connections for DriveLens state persistence
///
/// The pool is configured with 5 max connections and a 5-second acquire
/// timeout to surface outages quickly rather than queueing callers.
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Creates a new pool connected to the given database URL
    ///
    /// Runs the base schema migration before returning. Vector
    /// infrastructure is NOT provisioned here; see
    /// [`crate::vector::ensure_vector_infra`].
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the connection cannot be
    /// established, or `StoreError::Query` if migrations fail.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to connect to database: {e}"))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!("Database pool initialized");
        Ok(Self { pool })
    }

    /// Wraps an existing pool (tests construct pools their own way)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the base schema migration
    async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
        let migration_sql = include_str!("migrations/0001_schema.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to run base migration: {e}")))?;

        tracing::debug!("Database migrations completed");
        Ok(())
    }
}
