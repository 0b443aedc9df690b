//! MySQL backend over `sqlx`.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use tracing::debug;

use super::pool::{Connection, Pool};
use super::{DbError, PoolConfig, Row, Value};

/// A pool of MySQL connections built from a [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct MySqlPool {
    inner: sqlx::MySqlPool,
}

impl MySqlPool {
    /// Opens the pool and eagerly establishes `min_size` connections.
    ///
    /// # Errors
    ///
    /// - [`DbError::MissingSetting`] / [`DbError::InvalidSetting`]: `config`
    ///   fails [`PoolConfig::validate`].
    /// - [`DbError::Connect`]: the server refused or could not be reached.
    pub async fn connect(config: &PoolConfig) -> Result<Self, DbError> {
        let credentials = config.validate()?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(credentials.user)
            .password(credentials.password)
            .database(credentials.database)
            .charset(&config.charset);

        let inner = MySqlPoolOptions::new()
            .max_connections(config.max_size)
            .min_connections(config.min_size)
            .connect_with(options)
            .await
            .map_err(|source| DbError::Connect {
                backend: "mysql",
                source,
            })?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Pool for MySqlPool {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>, DbError> {
        if self.inner.is_closed() {
            return Err(DbError::Closed);
        }
        let conn = self.inner.acquire().await.map_err(DbError::Acquire)?;
        Ok(Box::new(MySqlConnection { conn }))
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

struct MySqlConnection {
    conn: PoolConnection<MySql>,
}

impl MySqlConnection {
    // Sent as plain text: MySQL refuses transaction control through the
    // prepared-statement protocol.
    async fn run_control(&mut self, op: &'static str) -> Result<(), DbError> {
        sqlx::Executor::execute(&mut *self.conn, op)
            .await
            .map_err(|source| DbError::Transaction { op, source })?;
        Ok(())
    }
}

#[async_trait]
impl Connection for MySqlConnection {
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
    mut query: Query<'q, MySql, MySqlArguments>,
    args: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
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

fn decode(row: &MySqlRow) -> Result<Row, DbError> {
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
            let decoded = match type_name.as_str() {
                "BOOLEAN" => row.try_get_unchecked::<bool, _>(i).map(Value::Bool),
                "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                    row.try_get_unchecked::<i64, _>(i).map(Value::Int)
                }
                "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED"
                | "INT UNSIGNED" | "BIGINT UNSIGNED" => row
                    .try_get_unchecked::<u64, _>(i)
                    .map(|n| i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)),
                "FLOAT" => row
                    .try_get_unchecked::<f32, _>(i)
                    .map(|x| Value::Float(f64::from(x))),
                "DOUBLE" => row.try_get_unchecked::<f64, _>(i).map(Value::Float),
                "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
                    .try_get_unchecked::<Vec<u8>, _>(i)
                    .map(|b| Value::Text(String::from_utf8_lossy(&b).into_owned())),
                // DECIMAL travels as text on the wire.
                _ => row.try_get_unchecked::<String, _>(i).map(Value::Text),
            };
            decoded.map_err(|e| decode_err(&type_name, e))?
        };
        out.insert(column.name().to_owned(), value);
    }
    Ok(out)
}
