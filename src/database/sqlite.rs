//! SQLite backend over `sqlx`, for embedded deployments and tests.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use super::pool::{Connection, Pool};
use super::{DbError, Row, Value};

/// A pool of SQLite connections.
///
/// # Examples
///
/// ```rust,no_run
/// use weft::database::{Database, SqlitePool};
///
/// # async fn example() -> Result<(), weft::database::DbError> {
/// let db = Database::from_pool(SqlitePool::connect("sqlite://blog.db", 4).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqlitePool {
    inner: sqlx::SqlitePool,
}

impl SqlitePool {
    /// Opens a pool of at most `max_size` connections to `url`.
    pub async fn connect(url: &str, max_size: u32) -> Result<Self, DbError> {
        let inner = SqlitePoolOptions::new()
            .max_connections(max_size)
            .connect(url)
            .await
            .map_err(|source| DbError::Connect {
                backend: "sqlite",
                source,
            })?;
        info!(url, max_size, "opened sqlite pool");
        Ok(Self { inner })
    }

    /// Opens a private in-memory database.
    ///
    /// Every SQLite connection to `:memory:` sees its own database, so the pool
    /// is pinned to one connection that is never recycled.
    pub async fn memory() -> Result<Self, DbError> {
        let inner = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|source| DbError::Connect {
                backend: "sqlite",
                source,
            })?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Pool for SqlitePool {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>, DbError> {
        if self.inner.is_closed() {
            return Err(DbError::Closed);
        }
        let conn = self.inner.acquire().await.map_err(DbError::Acquire)?;
        Ok(Box::new(SqliteConnection { conn }))
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

struct SqliteConnection {
    conn: PoolConnection<Sqlite>,
}

impl SqliteConnection {
    async fn run_control(&mut self, op: &'static str) -> Result<(), DbError> {
        sqlx::Executor::execute(&mut *self.conn, op)
            .await
            .map_err(|source| DbError::Transaction { op, source })?;
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn fetch(
        &mut self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DbError> {
        let mut stream = bind(sqlx::query(sql), args).fetch(&mut *self.conn);
        let mut rows = Vec::new();

        while limit.is_none_or(|n| rows.len() < n) {
            let next = stream.try_next().await.map_err(|source| DbError::Statement {
                sql: sql.to_owned(),
                source,
            })?;
            let Some(row) = next else { break };
            rows.push(decode(&row)?);
        }
        Ok(rows)
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, DbError> {
        let done = bind(sqlx::query(sql), args)
            .execute(&mut *self.conn)
            .await
            .map_err(|source| DbError::Statement {
                sql: sql.to_owned(),
                source,
            })?;
        Ok(done.rows_affected())
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        self.run_control("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.run_control("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.run_control("ROLLBACK").await
    }

    async fn discard(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "closing discarded connection failed");
        }
    }
}

fn bind<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg.clone() {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(b),
            Value::Int(n) => query.bind(n),
            Value::Float(x) => query.bind(x),
            Value::Text(s) => query.bind(s),
        };
    }
    query
}

// SQLite reports the storage class of each value, not the declared column type;
// the record layer coerces booleans back from integers.
fn decode(row: &SqliteRow) -> Result<Row, DbError> {
    let mut out = Row::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let decode_err = |type_name: &str, source| DbError::Decode {
            column: column.name().to_owned(),
            type_name: type_name.to_owned(),
            source,
        };

        let raw = row.try_get_raw(i).map_err(|e| decode_err("?", e))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_owned();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => row
                    .try_get_unchecked::<i64, _>(i)
                    .map(Value::Int),
                "REAL" | "NUMERIC" => row
                    .try_get_unchecked::<f64, _>(i)
                    .map(Value::Float),
                "BLOB" => row
                    .try_get_unchecked::<Vec<u8>, _>(i)
                    .map(|b| Value::Text(String::from_utf8_lossy(&b).into_owned())),
                _ => row
                    .try_get_unchecked::<String, _>(i)
                    .map(Value::Text),
            }
            .map_err(|e| decode_err(&type_name, e))?
        };
        out.insert(column.name().to_owned(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn scratch() -> Database {
        let db = Database::from_pool(SqlitePool::memory().await.unwrap());
        db.execute(
            "create table `t` (`id` bigint not null primary key, `name` varchar(50), `score` real, `flag` boolean)",
            &[],
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn write_then_read() {
        let db = scratch().await;
        let n = db
            .execute(
                "insert into `t` (`name`, `score`, `flag`, `id`) values (?, ?, ?, ?)",
                &["alpha".into(), Value::Float(1.5), Value::Bool(true), Value::Int(1)],
            )
            .await
            .unwrap();
        assert_eq!(n, 1);

        let rows = db.select("select * from `t`", &[], None).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row["id"], Value::Int(1));
        assert_eq!(row["name"], Value::Text("alpha".into()));
        assert_eq!(row["score"], Value::Float(1.5));
        assert_eq!(row["flag"], Value::Int(1));
        assert_eq!(row.keys().collect::<Vec<_>>(), ["id", "name", "score", "flag"]);
    }

    #[tokio::test]
    async fn nulls_survive() {
        let db = scratch().await;
        db.execute(
            "insert into `t` (`id`, `name`) values (?, ?)",
            &[Value::Int(2), Value::Null],
        )
        .await
        .unwrap();
        let rows = db.select("select `name` from `t`", &[], None).await.unwrap();
        assert_eq!(rows[0]["name"], Value::Null);
    }

    #[tokio::test]
    async fn limit_stops_the_cursor() {
        let db = scratch().await;
        for id in 0..6 {
            db.execute("insert into `t` (`id`) values (?)", &[Value::Int(id)])
                .await
                .unwrap();
        }
        let rows = db.select("select `id` from `t`", &[], Some(4)).await.unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[tokio::test]
    async fn rolled_back_transaction_leaves_no_write() {
        let db = scratch().await;
        db.execute("insert into `t` (`id`) values (?)", &[Value::Int(1)])
            .await
            .unwrap();

        // Duplicate key: the statement fails inside the explicit transaction.
        let err = db
            .execute_with("insert into `t` (`id`) values (?)", &[Value::Int(1)], false)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Statement { .. }));

        // The connection is usable again, so the rollback closed the transaction.
        db.execute_with("insert into `t` (`id`) values (?)", &[Value::Int(2)], false)
            .await
            .unwrap();
        let rows = db.select("select `id` from `t`", &[], None).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn closed_pool_refuses_work() {
        let db = scratch().await;
        db.close().await;
        assert!(matches!(
            db.select("select 1", &[], None).await,
            Err(DbError::Closed)
        ));
    }
}
