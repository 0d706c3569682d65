//! Pool lifecycle, grounded on `retail-surveillance/src/database.rs`'s
//! `Database::new`/`run_migrations` shape and
//! `Coldaine-recall-pipeline/capture/recall-db/src/db.rs`'s pool sizing.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Min/max bounded connection pool shared across handlers (§5).
pub const POOL_MIN_CONNECTIONS: u32 = 2;
pub const POOL_MAX_CONNECTIONS: u32 = 20;
pub const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Exponential backoff schedule for recoverable store errors (§5, §7).
pub const STORE_RETRY_BACKOFF_SECS: [u64; 5] = [1, 2, 4, 8, 16];

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("connecting to postgres");
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(STORE_TIMEOUT)
            .connect(database_url)
            .await
            .context("failed to connect to postgres")?;
        info!("postgres connection pool established");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        info!("database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("database health check failed")?;
        Ok(())
    }
}

/// Returns `true` for errors worth retrying with backoff: connection resets,
/// timeouts, and pool exhaustion. Anything else (constraint violations,
/// malformed SQL) is a programming error and must not be retried.
pub fn is_recoverable(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

/// Runs `op` with the standard store retry schedule (§5/§7): up to
/// `STORE_RETRY_BACKOFF_SECS.len()` retries, sleeping the matching backoff
/// step between attempts, only for errors `is_recoverable` accepts.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if is_recoverable(&e) && attempt < STORE_RETRY_BACKOFF_SECS.len() => {
                let backoff = STORE_RETRY_BACKOFF_SECS[attempt];
                tracing::warn!(op = op_name, attempt, backoff_secs = backoff, error = %e, "retrying store operation");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
