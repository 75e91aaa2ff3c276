//! Postgres-backed durable lock store.
//!
//! The `incident_locks` table is the cross-instance source of truth. Claims
//! are a single conditional `INSERT … ON CONFLICT` statement; Postgres'
//! row locking on the primary key is the only serialization point.

pub mod locks;

use std::time::Duration;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres. Acquiring a connection is bounded by
    /// `acquire_timeout` so a dead store surfaces as an error, not a hang.
    pub async fn connect(url: &str, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Build a handle that connects on first use. Invocations that never
    /// reach the store never open a connection.
    pub fn connect_lazy(url: &str, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check: SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
