//! Store configuration
//!
//! Configuration is read from environment variables by [`StoreConfig::from_env`].
//! The lookup is injectable through [`StoreConfig::from_source`] so tests do not
//! have to mutate the process environment.

use std::time::Duration;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub idle_timeout: Option<u64>,
    pub max_lifetime: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
            idle_timeout: Some(600),  // 10 minutes
            max_lifetime: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout)
    }
}

/// Configuration for batched relationship loading
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of keys shipped in a single `IN (...)` list.
    ///
    /// A batched level issues `ceil(keys / max_batch_size)` queries; the default
    /// stays below PostgreSQL's bind-parameter limit so ordinary result sets
    /// load each level in exactly one round trip.
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 30_000,
        }
    }
}

/// Top-level store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub pool: PoolConfig,
    pub batch: BatchConfig,
    /// Echo every statement on the `storefront_orm::sql` tracing target at INFO
    pub log_sql: bool,
}

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "STOREFRONT_MAX_CONNECTIONS";
pub const ENV_MIN_CONNECTIONS: &str = "STOREFRONT_MIN_CONNECTIONS";
pub const ENV_ACQUIRE_TIMEOUT: &str = "STOREFRONT_ACQUIRE_TIMEOUT_SECS";
pub const ENV_BATCH_SIZE: &str = "STOREFRONT_BATCH_SIZE";
pub const ENV_LOG_SQL: &str = "STOREFRONT_LOG_SQL";

impl StoreConfig {
    /// Build a configuration for the given URL with defaults everywhere else
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: PoolConfig::default(),
            batch: BatchConfig::default(),
            log_sql: false,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(ENV_DATABASE_URL).ok_or_else(|| ConfigError::MissingRequired {
            field: ENV_DATABASE_URL.to_string(),
            hint: "Set it to a postgres:// connection string or a sqlite: path".to_string(),
        })?;

        let mut config = Self::new(database_url);

        if let Some(value) = lookup(ENV_MAX_CONNECTIONS) {
            config.pool.max_connections = parse_number(ENV_MAX_CONNECTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_MIN_CONNECTIONS) {
            config.pool.min_connections = parse_number(ENV_MIN_CONNECTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_ACQUIRE_TIMEOUT) {
            config.pool.acquire_timeout = parse_number(ENV_ACQUIRE_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_BATCH_SIZE) {
            config.batch.max_batch_size = parse_number(ENV_BATCH_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_SQL) {
            config.log_sql = parse_bool(ENV_LOG_SQL, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Whether the URL names a SQLite database rather than a PostgreSQL server
    pub fn is_sqlite(&self) -> bool {
        self.database_url.starts_with("sqlite:")
    }

    /// `sqlite::memory:` and `sqlite://:memory:` name a private in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.is_sqlite() && self.database_url.contains(":memory:")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.database_url).map_err(|_| ConfigError::InvalidValue {
            field: ENV_DATABASE_URL.to_string(),
            value: self.database_url.clone(),
            expected: "a valid URL".to_string(),
        })?;

        if !matches!(parsed.scheme(), "postgres" | "postgresql" | "sqlite") {
            return Err(ConfigError::InvalidValue {
                field: ENV_DATABASE_URL.to_string(),
                value: self.database_url.clone(),
                expected: "postgres://, postgresql:// or sqlite: scheme".to_string(),
            });
        }

        if self.pool.max_connections == 0 || self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::InvalidValue {
                field: ENV_MAX_CONNECTIONS.to_string(),
                value: self.pool.max_connections.to_string(),
                expected: format!("at least 1 and >= min_connections ({})", self.pool.min_connections),
            });
        }

        if self.batch.max_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: ENV_BATCH_SIZE.to_string(),
                value: "0".to_string(),
                expected: "a positive number of keys".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: "a non-negative integer".to_string(),
    })
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true or false".to_string(),
        }),
    }
}
