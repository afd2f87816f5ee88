use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{DEFAULT_API_BASE, MAX_FETCH_LIMIT};
use crate::db::{sqlite_url, Backend, StoreProfile, TimestampFormat};
use crate::discord::DiscordConfig;
use crate::sync::SyncSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Connection parameters for the client/server backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlServerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub channel_id: String,
    pub genesis_message_id: String,
    pub fetch_genesis: bool,
    pub api_base: String,
    pub request_timeout: Duration,

    // Sync loop
    pub fetch_limit: u8,
    pub idle_interval: Duration,
    pub retry_backoff: Duration,
    pub retry_backoff_max: Duration,
    pub reconnect_interval: Duration,

    // Store
    pub backend: Backend,
    pub database_path: PathBuf,
    pub sql_server: Option<SqlServerConfig>,
    pub store_embeds: bool,
    pub timestamp_format: TimestampFormat,
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = parse_backend(&env_or_default("STORE_BACKEND", "sqlite"))?;
        let sql_server = match backend {
            Backend::Sqlite => None,
            Backend::MySql => Some(SqlServerConfig {
                host: required_env("SQL_HOST")?,
                port: parse_env_u16("SQL_PORT", 3306)?,
                user: required_env("SQL_USER")?,
                password: required_env("SQL_PASSWORD")?,
                database: required_env("SQL_DATABASE")?,
            }),
        };
        let timestamp_format = match optional_env("TIMESTAMP_FORMAT") {
            Some(value) => parse_timestamp_format(&value)?,
            None => backend.default_timestamp_format(),
        };

        Ok(Self {
            // Discord
            discord_token: required_env("DISCORD_TOKEN")?,
            channel_id: required_env("CHANNEL_ID")?,
            genesis_message_id: required_env("GENESIS_MESSAGE_ID")?,
            fetch_genesis: parse_env_bool("FETCH_GENESIS", false)?,
            api_base: env_or_default("DISCORD_API_BASE", DEFAULT_API_BASE),
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),

            // Sync loop
            fetch_limit: parse_env_u8("FETCH_LIMIT", 50)?,
            idle_interval: Duration::from_secs(parse_env_u64("IDLE_INTERVAL_SECS", 10)?),
            retry_backoff: Duration::from_secs(parse_env_u64("RETRY_BACKOFF_SECS", 5)?),
            retry_backoff_max: Duration::from_secs(parse_env_u64("RETRY_BACKOFF_MAX_SECS", 60)?),
            reconnect_interval: Duration::from_secs(parse_env_u64("RECONNECT_INTERVAL_SECS", 15)?),

            // Store
            backend,
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/mirror.sqlite")),
            sql_server,
            store_embeds: parse_env_bool("STORE_EMBEDS", true)?,
            timestamp_format,
            max_connections: parse_env_u32("SQL_MAX_CONNECTIONS", 5)?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord_token.trim().is_empty() {
            return Err(invalid("DISCORD_TOKEN", "cannot be empty"));
        }
        if !is_snowflake(&self.channel_id) {
            return Err(invalid("CHANNEL_ID", "must be a numeric Discord id"));
        }
        if !is_snowflake(&self.genesis_message_id) {
            return Err(invalid("GENESIS_MESSAGE_ID", "must be a numeric Discord id"));
        }
        if self.fetch_limit == 0 || self.fetch_limit > MAX_FETCH_LIMIT {
            return Err(invalid(
                "FETCH_LIMIT",
                &format!("must be between 1 and {MAX_FETCH_LIMIT}"),
            ));
        }
        if self.retry_backoff > self.retry_backoff_max {
            return Err(invalid(
                "RETRY_BACKOFF_SECS",
                "cannot exceed RETRY_BACKOFF_MAX_SECS",
            ));
        }
        if self.max_connections == 0 {
            return Err(invalid("SQL_MAX_CONNECTIONS", "must be at least 1"));
        }
        if url::Url::parse(&self.api_base).is_err() {
            return Err(invalid("DISCORD_API_BASE", "must be an absolute URL"));
        }
        if self.backend == Backend::MySql && self.sql_server.is_none() {
            return Err(invalid(
                "STORE_BACKEND",
                "mysql requires SQL_HOST, SQL_USER, SQL_PASSWORD and SQL_DATABASE",
            ));
        }
        Ok(())
    }

    /// Capability descriptor for the configured store.
    #[must_use]
    pub fn store_profile(&self) -> StoreProfile {
        StoreProfile {
            backend: self.backend,
            embeds: self.store_embeds,
            timestamps: self.timestamp_format,
        }
    }

    /// Connection URL for the configured backend.
    #[must_use]
    pub fn database_url(&self) -> String {
        match (&self.backend, &self.sql_server) {
            (Backend::MySql, Some(server)) => format!(
                "mysql://{}:{}@{}:{}/{}",
                urlencoding::encode(&server.user),
                urlencoding::encode(&server.password),
                server.host,
                server.port,
                urlencoding::encode(&server.database),
            ),
            _ => sqlite_url(&self.database_path),
        }
    }

    #[must_use]
    pub fn discord_config(&self) -> DiscordConfig {
        DiscordConfig {
            token: self.discord_token.clone(),
            channel_id: self.channel_id.clone(),
            api_base: self.api_base.trim_end_matches('/').to_string(),
            request_timeout: self.request_timeout,
        }
    }

    #[must_use]
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            seed_cursor: self.genesis_message_id.clone(),
            fetch_limit: self.fetch_limit,
            idle_interval: self.idle_interval,
            retry_backoff: self.retry_backoff,
            retry_backoff_max: self.retry_backoff_max,
            reconnect_interval: self.reconnect_interval,
        }
    }

    /// Configuration with sensible defaults for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            discord_token: "test-token".to_string(),
            channel_id: "100000000000000000".to_string(),
            genesis_message_id: "0".to_string(),
            fetch_genesis: false,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(5),
            fetch_limit: 50,
            idle_interval: Duration::from_millis(10),
            retry_backoff: Duration::from_millis(10),
            retry_backoff_max: Duration::from_millis(40),
            reconnect_interval: Duration::from_millis(10),
            backend: Backend::Sqlite,
            database_path: PathBuf::from("./data/test.sqlite"),
            sql_server: None,
            store_embeds: true,
            timestamp_format: TimestampFormat::EpochMillis,
            max_connections: 1,
        }
    }
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn is_snowflake(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_number<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.trim().parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    parse_env_number(name, default)
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    parse_env_number(name, default)
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    parse_env_number(name, default)
}

fn parse_env_u8(name: &str, default: u8) -> Result<u8, ConfigError> {
    parse_env_number(name, default)
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_backend(value: &str) -> Result<Backend, ConfigError> {
    match value.to_lowercase().as_str() {
        "sqlite" | "file" => Ok(Backend::Sqlite),
        "mysql" | "mariadb" => Ok(Backend::MySql),
        _ => Err(ConfigError::InvalidValue {
            name: "STORE_BACKEND".to_string(),
            message: format!("must be 'sqlite' or 'mysql', got '{value}'"),
        }),
    }
}

fn parse_timestamp_format(value: &str) -> Result<TimestampFormat, ConfigError> {
    match value.to_lowercase().as_str() {
        "millis" | "integer" => Ok(TimestampFormat::EpochMillis),
        "rfc3339" | "text" => Ok(TimestampFormat::Rfc3339),
        _ => Err(ConfigError::InvalidValue {
            name: "TIMESTAMP_FORMAT".to_string(),
            message: format!("must be 'millis' or 'rfc3339', got '{value}'"),
        }),
    }
}
