//! Structured logging setup
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the embedding application. [`init_logging`] is a convenience for binaries and
//! integration tests. Statement echo is emitted on the [`SQL_TARGET`] target.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing target used for every statement sent to the store
pub const SQL_TARGET: &str = "storefront_orm::sql";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json_format: bool,
    /// Environment filter (e.g. "storefront_orm=debug,storefront_orm::sql=info")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Development configuration: statement echo enabled
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            env_filter: Some(format!("storefront_orm=debug,{}=debug", SQL_TARGET)),
        }
    }

    /// Production configuration: JSON lines, statement echo off
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            env_filter: Some(format!("storefront_orm=info,{}=warn", SQL_TARGET)),
        }
    }

    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }
}

/// Install a global subscriber. Fails if one is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let directives = config.env_filter.as_deref().unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directives))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout))
            .try_init()?;
    }

    tracing::info!(
        target: "storefront_orm::logging",
        "Logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let dev = LoggingConfig::development();
        assert!(dev.env_filter.as_deref().unwrap().contains(SQL_TARGET));
        assert!(!dev.json_format);

        let prod = LoggingConfig::production();
        assert!(prod.json_format);
        assert_eq!(prod.level, "info");
    }

    #[test]
    fn test_filter_directives_parse() {
        for config in [LoggingConfig::default(), LoggingConfig::development(), LoggingConfig::production()] {
            let directives = config.env_filter.clone().unwrap_or(config.level.clone());
            assert!(EnvFilter::try_new(directives).is_ok());
        }
    }
}
