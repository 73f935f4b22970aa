//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Accepted API keys
    pub api_keys: Vec<ApiKeyConfig>,

    /// Cards a single user may hold
    pub max_cards_per_user: usize,

    /// Interval of the background limit sweep; `None` disables it
    pub limit_sweep_interval: Option<Duration>,

    /// Log output format
    pub log_format: LogFormat,
}

/// One configured API key, identified by the SHA-256 of the raw key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyConfig {
    pub name: String,
    /// Lowercase hex SHA-256 of the key
    pub key_hash: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let api_keys = parse_api_keys(&env::var("API_KEYS").unwrap_or_default())?;
        if api_keys.is_empty() && environment == "production" {
            return Err(ConfigError::MissingEnv("API_KEYS"));
        }

        let max_cards_per_user = env::var("MAX_CARDS_PER_USER")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("MAX_CARDS_PER_USER"))?;

        let sweep_secs: u64 = env::var("LIMIT_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("LIMIT_SWEEP_INTERVAL_SECS"))?;
        let limit_sweep_interval = (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs));

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("text") | Err(_) => LogFormat::Text,
            Ok(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            api_keys,
            max_cards_per_user,
            limit_sweep_interval,
            log_format,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Parse `name:sha256hex[:perm|perm],...`
pub fn parse_api_keys(raw: &str) -> Result<Vec<ApiKeyConfig>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let name = parts.next().unwrap_or_default().trim();
            let key_hash = parts.next().unwrap_or_default().trim().to_lowercase();
            let permissions = parts
                .next()
                .map(|p| {
                    p.split('|')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let is_sha256_hex = key_hash.len() == 64 && key_hash.chars().all(|c| c.is_ascii_hexdigit());
            if name.is_empty() || !is_sha256_hex {
                return Err(ConfigError::InvalidValue("API_KEYS"));
            }

            Ok(ApiKeyConfig {
                name: name.to_string(),
                key_hash,
                permissions,
            })
        })
        .collect()
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";

    #[test]
    fn test_parse_api_keys() {
        let raw = format!("backoffice:{}:admin|read, mobile:{}", HASH, HASH.to_uppercase());
        let keys = parse_api_keys(&raw).unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].name, "backoffice");
        assert_eq!(keys[0].permissions, vec!["admin".to_string(), "read".to_string()]);
        assert_eq!(keys[1].key_hash, HASH);
        assert!(keys[1].permissions.is_empty());
    }

    #[test]
    fn test_parse_api_keys_rejects_bad_hash() {
        assert!(matches!(
            parse_api_keys("mobile:not-a-hash"),
            Err(ConfigError::InvalidValue("API_KEYS"))
        ));
        assert!(parse_api_keys("").unwrap().is_empty());
    }
}
