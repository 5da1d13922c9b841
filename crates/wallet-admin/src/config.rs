//! Admin configuration loaded from environment variables.

use crate::error::{AdminError, Result};

/// Connection and logging settings.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DB_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_JSON`: emit JSON log lines when `true` or `1` (default: `false`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: String,
    pub log_json: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or(AdminError::MissingConfig("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(10),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_JSON")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true"))
                .unwrap_or(false),
        })
    }
}
