use std::str::FromStr;

use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::{AnyPool, ConnectOptions};
use stowage_core::config::{ConfigError, FromConfig, StowageConfig};
use stowage_data::{DataError, Dialect};

use crate::error::SqlxErrorExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
    Postgres,
}

impl Driver {
    pub fn dialect(self) -> Dialect {
        match self {
            Driver::Sqlite => Dialect::Sqlite,
            Driver::Postgres => Dialect::Postgres,
        }
    }

    /// Check that `url` belongs to this driver, completing bare SQLite paths.
    ///
    /// A bare path such as `data.db` becomes `sqlite:data.db?mode=rwc`, so the
    /// file is created when missing.
    pub fn normalize_url(self, url: &str) -> Result<String, DataError> {
        match self {
            Driver::Sqlite if url.starts_with("sqlite:") => Ok(url.to_string()),
            Driver::Sqlite if url.contains("://") => Err(DataError::InvalidInput(format!(
                "url scheme does not match the sqlite driver: {}",
                scheme(url)
            ))),
            Driver::Sqlite if url == ":memory:" => Ok("sqlite::memory:".to_string()),
            Driver::Sqlite if url.contains('?') => Ok(format!("sqlite:{url}")),
            Driver::Sqlite => Ok(format!("sqlite:{url}?mode=rwc")),
            Driver::Postgres
                if url.starts_with("postgres://") || url.starts_with("postgresql://") =>
            {
                Ok(url.to_string())
            }
            Driver::Postgres => Err(DataError::InvalidInput(format!(
                "url scheme does not match the postgres driver: {}",
                scheme(url)
            ))),
        }
    }
}

fn scheme(url: &str) -> &str {
    url.split_once(':').map_or(url, |(scheme, _)| scheme)
}

impl FromStr for Driver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            "pg" | "postgres" | "postgresql" => Ok(Driver::Postgres),
            other => Err(format!("unknown database driver '{other}'")),
        }
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Driver::Sqlite => f.write_str("sqlite"),
            Driver::Postgres => f.write_str("pg"),
        }
    }
}

/// Connection settings, read from `stowage.database.*`.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub driver: Driver,
    pub url: String,
    pub pool_max: u32,
    /// Emit every generated statement at `info` instead of `trace`.
    pub log_queries: bool,
}

impl DatabaseConfig {
    pub fn new(driver: Driver, url: impl Into<String>) -> Self {
        Self {
            driver,
            url: url.into(),
            pool_max: 10,
            log_queries: false,
        }
    }

    pub fn pool_max(mut self, pool_max: u32) -> Self {
        self.pool_max = pool_max;
        self
    }

    pub fn log_queries(mut self, log_queries: bool) -> Self {
        self.log_queries = log_queries;
        self
    }
}

impl FromConfig for DatabaseConfig {
    fn prefix() -> &'static str {
        "stowage.database"
    }

    fn from_config(config: &StowageConfig) -> Result<Self, ConfigError> {
        let driver: String = config.get_or("stowage.database.driver", "sqlite".to_string())?;
        let driver = driver.parse().map_err(|message| ConfigError::Invalid {
            key: "stowage.database.driver".into(),
            message,
        })?;
        Ok(Self {
            driver,
            url: config.get("stowage.database.url")?,
            pool_max: config.get_or("stowage.database.pool_max", 10)?,
            log_queries: config.get_or("stowage.database.log_queries", false)?,
        })
    }
}

/// Open a pool for `config`.
///
/// `sqlx`'s own statement logging is disabled; the repository logs the
/// statements it generates through `tracing`.
pub async fn connect(config: &DatabaseConfig) -> Result<AnyPool, DataError> {
    sqlx::any::install_default_drivers();

    let url = config.driver.normalize_url(&config.url)?;
    let options = AnyConnectOptions::from_str(&url)
        .map_err(SqlxErrorExt::into_data_error)?
        .disable_statement_logging();

    let mut pool_options = AnyPoolOptions::new().max_connections(config.pool_max.max(1));
    if url.contains(":memory:") {
        // Every connection to an in-memory database sees its own database
        if config.pool_max > 1 {
            tracing::warn!(
                pool_max = config.pool_max,
                "in-memory sqlite with more than one connection, each connection gets a separate database"
            );
        }
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(SqlxErrorExt::into_data_error)?;

    tracing::info!(
        driver = %config.driver,
        pool_max = config.pool_max,
        log_queries = config.log_queries,
        "database pool ready"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::ConfigValue;

    #[test]
    fn driver_names() {
        assert_eq!("pg".parse::<Driver>(), Ok(Driver::Postgres));
        assert_eq!("Postgres".parse::<Driver>(), Ok(Driver::Postgres));
        assert_eq!("sqlite".parse::<Driver>(), Ok(Driver::Sqlite));
        assert!("mysql".parse::<Driver>().is_err());
    }

    #[test]
    fn sqlite_urls_are_completed() {
        assert_eq!(
            Driver::Sqlite.normalize_url(":memory:").unwrap(),
            "sqlite::memory:"
        );
        assert_eq!(
            Driver::Sqlite.normalize_url("app.db").unwrap(),
            "sqlite:app.db?mode=rwc"
        );
        assert_eq!(
            Driver::Sqlite.normalize_url("sqlite://app.db").unwrap(),
            "sqlite://app.db"
        );
    }

    #[test]
    fn mismatched_scheme_is_rejected() {
        let err = Driver::Sqlite
            .normalize_url("postgres://localhost/app")
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidInput(ref msg) if msg.contains("postgres")));
        assert!(Driver::Postgres.normalize_url("app.db").is_err());
        assert!(Driver::Postgres
            .normalize_url("postgresql://u:p@db/app")
            .is_ok());
    }

    #[test]
    fn config_section() {
        let mut config = StowageConfig::empty();
        config.set("stowage.database.driver", ConfigValue::String("pg".into()));
        config.set(
            "stowage.database.url",
            ConfigValue::String("postgres://localhost/app".into()),
        );
        config.set("stowage.database.pool_max", ConfigValue::Integer(4));
        let db: DatabaseConfig = config.section().unwrap();
        assert_eq!(db.driver, Driver::Postgres);
        assert_eq!(db.pool_max, 4);
        assert!(!db.log_queries);
    }

    #[test]
    fn config_requires_url() {
        let err = StowageConfig::empty()
            .section::<DatabaseConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn unknown_driver_in_config() {
        let mut config = StowageConfig::empty();
        config.set("stowage.database.driver", ConfigValue::String("oracle".into()));
        config.set("stowage.database.url", ConfigValue::String("x".into()));
        let err = config.section::<DatabaseConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
