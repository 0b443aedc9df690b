//! Database layer: pooled, parameterized reads and writes.
//!
//! [`Database`] is the handle the rest of the crate threads through every call
//! that touches storage. It wraps any [`Pool`] implementation:
//!
//! | Backend        | Constructor                      |
//! |----------------|----------------------------------|
//! | MySQL          | [`Database::connect`]            |
//! | SQLite         | [`Database::from_pool`] + [`SqlitePool`] |
//! | anything else  | [`Database::from_pool`]          |
//!
//! Statements are written with `?` placeholders and translated to the
//! backend's native syntax at execution time.

use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod config;
pub mod mysql;
pub mod pool;
pub mod sqlite;
pub mod value;

pub use config::{Credentials, PoolConfig};
pub use mysql::MySqlPool;
pub use pool::{Connection, Placeholder, Pool};
pub use sqlite::SqlitePool;
pub use value::Value;

/// One result row: column name → value, in select-list order.
pub type Row = IndexMap<String, Value>;

/// Errors produced by the database layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("missing required connection setting: {field}")]
    MissingSetting { field: &'static str },

    #[error("invalid connection setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("failed to create {backend} connection pool: {source}")]
    Connect {
        backend: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to acquire a pooled connection: {0}")]
    Acquire(#[source] sqlx::Error),

    #[error("statement failed: {sql}: {source}")]
    Statement {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("transaction {op} failed: {source}")]
    Transaction {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("cannot decode column `{column}` of type {type_name}: {source}")]
    Decode {
        column: String,
        type_name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid limit value: {0}")]
    InvalidLimit(String),

    #[error("connection pool is closed")]
    Closed,

    /// Failure reported by a [`Pool`] implementation outside `sqlx`.
    #[error("{0}")]
    Backend(String),
}

/// Shared handle to a connection pool.
///
/// Cloning is cheap; every clone drives the same pool. Each call checks out one
/// connection for its own duration and returns it before completing.
///
/// # Examples
///
/// ```rust,no_run
/// use weft::database::{Database, PoolConfig};
///
/// # async fn example() -> Result<(), weft::database::DbError> {
/// let config = PoolConfig::from_env()?;
/// let db = Database::connect(&config).await?;
///
/// let rows = db.select("select `id` from `users` where `admin`=?", &[true.into()], Some(10)).await?;
/// let affected = db.execute("delete from `users` where `id`=?", &["0001".into()]).await?;
/// # let _ = (rows, affected);
/// db.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Database {
    pool: Arc<dyn Pool>,
    autocommit: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.pool.backend())
            .field("autocommit", &self.autocommit)
            .finish()
    }
}

impl Database {
    /// Validates `config` and opens a MySQL pool with it.
    ///
    /// # Errors
    ///
    /// - [`DbError::MissingSetting`] / [`DbError::InvalidSetting`]: `config`
    ///   fails [`PoolConfig::validate`].
    /// - [`DbError::Connect`]: the pool could not be established.
    pub async fn connect(config: &PoolConfig) -> Result<Self, DbError> {
        let credentials = config.validate()?;
        info!(
            host = %config.host,
            port = config.port,
            database = credentials.database,
            max_size = config.max_size,
            min_size = config.min_size,
            "creating database connection pool"
        );
        let pool = MySqlPool::connect(config).await?;
        Ok(Self {
            pool: Arc::new(pool),
            autocommit: config.autocommit,
        })
    }

    /// Wraps an already-built pool. `execute` defaults to autocommit.
    pub fn from_pool(pool: impl Pool + 'static) -> Self {
        Self {
            pool: Arc::new(pool),
            autocommit: true,
        }
    }

    /// Sets the transaction mode [`execute`](Self::execute) uses.
    #[must_use]
    pub fn with_autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.pool.backend()
    }

    /// Runs a parameterized read and returns its rows.
    ///
    /// When `limit` is set, at most that many rows are read from the cursor.
    pub async fn select(
        &self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DbError> {
        debug!(sql, ?args, "SQL");
        let sql = self.pool.placeholder().translate(sql);

        let mut conn = self.pool.acquire().await?;
        let rows = conn.fetch(&sql, args, limit).await?;

        debug!(rows = rows.len(), "rows returned");
        Ok(rows)
    }

    /// Runs a parameterized write in the handle's default transaction mode and
    /// returns the affected-row count.
    pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, DbError> {
        self.execute_with(sql, args, self.autocommit).await
    }

    /// Runs a parameterized write and returns the affected-row count.
    ///
    /// With `autocommit` off the statement runs inside an explicit transaction:
    /// it is committed on success, and any failure (statement or commit) is
    /// followed by a rollback before the error is returned. A connection whose
    /// rollback fails is closed rather than returned to the pool.
    pub async fn execute_with(
        &self,
        sql: &str,
        args: &[Value],
        autocommit: bool,
    ) -> Result<u64, DbError> {
        debug!(sql, ?args, autocommit, "SQL");
        let sql = self.pool.placeholder().translate(sql);

        let mut conn = self.pool.acquire().await?;
        if autocommit {
            return conn.execute(&sql, args).await;
        }

        conn.begin().await?;
        let outcome = match conn.execute(&sql, args).await {
            Ok(affected) => conn.commit().await.map(|()| affected),
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            if let Err(e) = conn.rollback().await {
                warn!(error = %e, "rollback failed, discarding connection");
                conn.discard().await;
            }
        }
        outcome
    }

    /// Closes the underlying pool. Leased connections finish their current
    /// call; new calls fail with [`DbError::Closed`].
    pub async fn close(&self) {
        info!(backend = self.pool.backend(), "closing database connection pool");
        self.pool.close().await;
    }
}
