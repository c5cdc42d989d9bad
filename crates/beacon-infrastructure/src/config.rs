//! Configuration
//!
//! Typed application configuration merged from `beacon.toml` and the
//! environment. Environment variables win over the file; the historical
//! `MYSQL_*`, `CLICKHOUSE_*`, `REDIS_*`, `SOURCEMAP_*`, and `AI_*`
//! variables are honored alongside the `BEACON_*` prefix.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use beacon_domain::error::{Error, Result};

/// Default sourcemap TTL: 30 days in seconds
const DEFAULT_SOURCEMAP_TTL_SECS: u64 = 2_592_000;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Max request body size in bytes (uploads are the ceiling)
    pub max_body_bytes: usize,
    /// Bearer token required on management routes
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            max_body_bytes: 64 * 1024 * 1024,
            auth_token: None,
        }
    }
}

/// MySQL connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MysqlConfig {
    /// Host name
    pub host: String,
    /// Port
    pub port: u16,
    /// User
    pub user: String,
    /// Password
    pub password: String,
    /// Database name
    pub database: String,
    /// Pool size
    pub max_connections: u32,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3306,
            user: "beacon".to_owned(),
            password: String::new(),
            database: "beacon".to_owned(),
            max_connections: 10,
        }
    }
}

impl MysqlConfig {
    /// Connection URL for the pool builder
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// ClickHouse connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickhouseConfig {
    /// HTTP endpoint, e.g. `http://localhost:8123`
    pub url: String,
    /// Database name
    pub database: String,
    /// User
    pub user: String,
    /// Password
    pub password: String,
}

impl Default for ClickhouseConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8123".to_owned(),
            database: "beacon".to_owned(),
            user: "default".to_owned(),
            password: String::new(),
        }
    }
}

/// Redis connection settings for the queue fabric
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_owned(),
        }
    }
}

/// Queue fabric worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Use the in-memory backend instead of Redis (tests, single node)
    pub in_memory: bool,
    /// Workers per queue
    pub concurrency: usize,
    /// Idle poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            in_memory: false,
            concurrency: 4,
            poll_interval_ms: 250,
        }
    }
}

/// On-disk storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for archives and sourcemaps
    pub base_path: PathBuf,
    /// Sourcemap TTL in seconds (`SOURCEMAP_STORAGE_TTL`)
    pub sourcemap_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./data"),
            sourcemap_ttl_secs: DEFAULT_SOURCEMAP_TTL_SECS,
        }
    }
}

impl StorageConfig {
    /// Root for uploaded source archives
    pub fn source_code_root(&self) -> PathBuf {
        self.base_path.join("source-code")
    }

    /// Root for sourcemap files
    pub fn sourcemap_root(&self) -> PathBuf {
        self.base_path.join("sourcemaps")
    }
}

/// AI analyzer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Kill switch (`AI_DIAGNOSIS_ENABLED`)
    pub enabled: bool,
    /// Completion endpoint of the provider
    pub endpoint: String,
    /// API key (`AI_API_KEY`)
    pub api_key: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            model: "default".to_owned(),
            timeout_secs: 110,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `RUST_LOG`-style filter, e.g. `info,beacon=debug`
    pub filter: String,
    /// Emit JSON records instead of the human format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            json: false,
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server
    pub server: ServerConfig,
    /// MySQL metadata store
    pub mysql: MysqlConfig,
    /// ClickHouse log store
    pub clickhouse: ClickhouseConfig,
    /// Redis queue backend
    pub redis: RedisConfig,
    /// Queue fabric workers
    pub queue: QueueConfig,
    /// On-disk storage
    pub storage: StorageConfig,
    /// AI analyzer
    pub ai: AiConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from `beacon.toml` (when present) and the environment.
    ///
    /// Precedence, lowest to highest: defaults, file, `BEACON_*` variables,
    /// historical `MYSQL_*` / `CLICKHOUSE_*` / `REDIS_*` / `SOURCEMAP_*` /
    /// `AI_*` variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the file or environment cannot be
    /// deserialized or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new("beacon.toml"));

        // one provider per historical variable, remapped to its config path
        let alias = |var: &'static str, key: &'static str| {
            Env::raw()
                .only(&[var])
                .map(move |_| key.into())
                .split(".")
        };

        let figment = Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed("BEACON_").split("__"))
            .merge(alias("MYSQL_HOST", "mysql.host"))
            .merge(alias("MYSQL_PORT", "mysql.port"))
            .merge(alias("MYSQL_USER", "mysql.user"))
            .merge(alias("MYSQL_PASSWORD", "mysql.password"))
            .merge(alias("MYSQL_DATABASE", "mysql.database"))
            .merge(alias("CLICKHOUSE_URL", "clickhouse.url"))
            .merge(alias("CLICKHOUSE_DATABASE", "clickhouse.database"))
            .merge(alias("CLICKHOUSE_USER", "clickhouse.user"))
            .merge(alias("CLICKHOUSE_PASSWORD", "clickhouse.password"))
            .merge(alias("REDIS_URL", "redis.url"))
            .merge(alias("SOURCEMAP_STORAGE_PATH", "storage.base_path"))
            .merge(alias("SOURCEMAP_STORAGE_TTL", "storage.sourcemap_ttl_secs"))
            .merge(alias("AI_DIAGNOSIS_ENABLED", "ai.enabled"))
            .merge(alias("AI_API_KEY", "ai.api_key"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::config(format!("configuration invalid: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue.concurrency == 0 {
            return Err(Error::config("queue.concurrency must be at least 1"));
        }
        if self.ai.enabled && self.ai.endpoint.is_empty() {
            return Err(Error::ConfigMissing(
                "ai.endpoint is required when diagnosis is enabled".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.sourcemap_ttl_secs, DEFAULT_SOURCEMAP_TTL_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enabled_ai_without_endpoint_is_rejected() {
        let config = AppConfig {
            ai: AiConfig {
                enabled: true,
                ..AiConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn mysql_url_is_well_formed() {
        let mysql = MysqlConfig::default();
        assert_eq!(mysql.url(), "mysql://beacon:@127.0.0.1:3306/beacon");
    }

    #[test]
    fn storage_roots_hang_off_the_base() {
        let storage = StorageConfig {
            base_path: PathBuf::from("/var/beacon"),
            ..StorageConfig::default()
        };
        assert_eq!(storage.sourcemap_root(), PathBuf::from("/var/beacon/sourcemaps"));
        assert_eq!(
            storage.source_code_root(),
            PathBuf::from("/var/beacon/source-code")
        );
    }
}
