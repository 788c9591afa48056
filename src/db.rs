use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::config::DatabaseConfig;
use crate::error::AppResult;
use crate::shutdown::Closeable;

/// Binds `params` in order onto a `query` or `query_as` builder.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut q = $query;
        for p in $params {
            q = match p {
                SqlParam::Null => q.bind(None::<i64>),
                SqlParam::Int(v) => q.bind(v),
                SqlParam::Real(v) => q.bind(v),
                SqlParam::Text(v) => q.bind(v),
                SqlParam::Bool(v) => q.bind(v),
            };
        }
        q
    }};
}

/// A positional bind parameter for raw SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

/// Shared handle to the connection pool.
///
/// Cloning is cheap; all clones share the pool and the closed flag, so
/// [`Database::shutdown`] runs its close exactly once no matter how many
/// holders call it.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    closed: Arc<AtomicBool>,
}

impl Database {
    pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .min_connections(cfg.min_connections)
            .max_connections(cfg.max_connections)
            .idle_timeout(Duration::from_millis(cfg.idle_timeout_ms))
            .acquire_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    tracing::debug!("Database pool connection created");
                    sqlx::query("PRAGMA foreign_keys=ON;").execute(&mut *conn).await?;
                    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await {
                        tracing::warn!("Failed to set busy_timeout: {}", e);
                    }
                    Ok(())
                })
            })
            .connect(&cfg.url)
            .await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool, closed: Arc::new(AtomicBool::new(false)) }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_schema(&self) -> anyhow::Result<()> {
        // WAL is best-effort; in-memory databases reject it
        if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(&self.pool).await {
            tracing::warn!("Failed to set WAL journal mode: {}", e);
        }

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            )"#,
        )
        .execute(&self.pool)
        .await?;

        if let Err(e) = sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_created ON users(created_at DESC)")
            .execute(&self.pool)
            .await
        {
            tracing::warn!("Failed to create index idx_users_created: {}", e);
        }

        Ok(())
    }

    /// Runs `sql` and maps every row into `T`.
    pub async fn query<T>(&self, sql: &str, params: Vec<SqlParam>) -> AppResult<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let q = bind_params!(sqlx::query_as::<_, T>(sql), params);
        q.fetch_all(&self.pool).await.map_err(|e| {
            tracing::error!(query = %sql, error = %e, "Raw query execution failed");
            e.into()
        })
    }

    /// Runs a statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str, params: Vec<SqlParam>) -> AppResult<u64> {
        let q = bind_params!(sqlx::query::<Sqlite>(sql), params);
        match q.execute(&self.pool).await {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) => {
                tracing::error!(query = %sql, error = %e, "Raw query execution failed");
                Err(e.into())
            }
        }
    }

    /// Runs `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    pub async fn transaction<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Transaction<'static, Sqlite>) -> BoxFuture<'c, AppResult<T>>,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                tracing::error!(error = %e, "Transaction failed");
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!("Rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    /// True when the pool answers `SELECT 1` within five seconds.
    pub async fn health_check(&self) -> bool {
        let probe = sqlx::query("SELECT 1").fetch_one(&self.pool);
        match tokio::time::timeout(Duration::from_secs(5), probe).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Database health check failed");
                false
            }
            Err(_) => {
                tracing::error!("Database health check timed out");
                false
            }
        }
    }

    /// Closes the pool. Later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Database pool already closed");
            return;
        }
        self.pool.close().await;
        tracing::info!("Database pool has been closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Closeable for Database {
    fn name(&self) -> &'static str {
        "database pool"
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.shutdown().await;
        Ok(())
    }
}
