//! Connection-pool settings, deserializable or read from the environment.

use serde::Deserialize;

use super::DbError;

/// Settings for [`Database::connect`](super::Database::connect).
///
/// Every field has a default except the credentials and database name, which
/// must be supplied; [`validate`](Self::validate) rejects a config missing any
/// of them.
///
/// # Examples
///
/// ```
/// use weft::database::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(
///     r#"{"user": "www-data", "password": "www-data", "database": "awesome"}"#,
/// ).unwrap();
///
/// assert_eq!(config.host, "localhost");
/// assert_eq!(config.port, 3306);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub charset: String,
    /// Default transaction mode for [`Database::execute`](super::Database::execute).
    pub autocommit: bool,
    pub max_size: u32,
    pub min_size: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 3306,
            user: None,
            password: None,
            database: None,
            charset: "utf8".to_owned(),
            autocommit: true,
            max_size: 10,
            min_size: 1,
        }
    }
}

impl PoolConfig {
    /// Reads `WEFT_DB_*` environment variables over the defaults.
    ///
    /// | Variable             | Field        |
    /// |----------------------|--------------|
    /// | `WEFT_DB_HOST`       | `host`       |
    /// | `WEFT_DB_PORT`       | `port`       |
    /// | `WEFT_DB_USER`       | `user`       |
    /// | `WEFT_DB_PASSWORD`   | `password`   |
    /// | `WEFT_DB_NAME`       | `database`   |
    /// | `WEFT_DB_CHARSET`    | `charset`    |
    /// | `WEFT_DB_AUTOCOMMIT` | `autocommit` |
    /// | `WEFT_DB_MAX_SIZE`   | `max_size`   |
    /// | `WEFT_DB_MIN_SIZE`   | `min_size`   |
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidSetting`] when a numeric or boolean variable
    /// does not parse.
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DbError> {
        let mut config = Self::default();

        if let Some(host) = lookup("WEFT_DB_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("WEFT_DB_PORT") {
            config.port = parse_setting("port", &port)?;
        }
        config.user = lookup("WEFT_DB_USER").or(config.user);
        config.password = lookup("WEFT_DB_PASSWORD").or(config.password);
        config.database = lookup("WEFT_DB_NAME").or(config.database);
        if let Some(charset) = lookup("WEFT_DB_CHARSET") {
            config.charset = charset;
        }
        if let Some(autocommit) = lookup("WEFT_DB_AUTOCOMMIT") {
            config.autocommit = parse_setting("autocommit", &autocommit)?;
        }
        if let Some(max) = lookup("WEFT_DB_MAX_SIZE") {
            config.max_size = parse_setting("max_size", &max)?;
        }
        if let Some(min) = lookup("WEFT_DB_MIN_SIZE") {
            config.min_size = parse_setting("min_size", &min)?;
        }

        Ok(config)
    }

    /// Checks that credentials and database name are present and the pool
    /// bounds are coherent, returning the credentials.
    ///
    /// # Errors
    ///
    /// - [`DbError::MissingSetting`]: `user`, `password` or `database` is absent.
    /// - [`DbError::InvalidSetting`]: `max_size` is zero or below `min_size`.
    pub fn validate(&self) -> Result<Credentials<'_>, DbError> {
        let user = self
            .user
            .as_deref()
            .ok_or(DbError::MissingSetting { field: "user" })?;
        let password = self
            .password
            .as_deref()
            .ok_or(DbError::MissingSetting { field: "password" })?;
        let database = self
            .database
            .as_deref()
            .ok_or(DbError::MissingSetting { field: "database" })?;
        if self.max_size == 0 || self.max_size < self.min_size {
            return Err(DbError::InvalidSetting {
                field: "max_size",
                reason: format!(
                    "must be positive and at least min_size ({})",
                    self.min_size
                ),
            });
        }
        Ok(Credentials {
            user,
            password,
            database,
        })
    }
}

/// Login details of a validated [`PoolConfig`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Credentials<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub database: &'a str,
}

fn parse_setting<T>(field: &'static str, raw: &str) -> Result<T, DbError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| DbError::InvalidSetting {
        field,
        reason: format!("{raw:?}: {e}"),
    })
}
