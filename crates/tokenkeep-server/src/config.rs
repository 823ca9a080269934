//! Process settings, read once from the environment at startup.
//!
//! Every setting is a plain environment variable (`DATABASE_URL`, `PORT`,
//! ...). A `.env` file is loaded by the binary before
//! [`loader::load_settings`] runs.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::http::HeaderValue;
use serde::Deserialize;
use tokenkeep_auth::{ConfigError, TokenConfig, UserDeletionPolicy};
use tokenkeep_auth_postgres::PostgresConfig;

/// Longest accepted purge interval (30 days).
pub const MAX_PURGE_INTERVAL_SECS: u64 = 30 * 24 * 3600;

/// Startup settings. `Debug` masks the database password and the JWT secret.
#[derive(Clone, Deserialize)]
pub struct Settings {
    /// PostgreSQL connection URL (`DATABASE_URL`).
    pub database_url: String,
    /// Access token signing secret, used verbatim (`JWT_SECRET`).
    pub jwt_secret: String,
    /// Access token lifetime in minutes (`ACCESS_TTL_MIN`).
    #[serde(default = "default_access_ttl_min")]
    pub access_ttl_min: u64,
    /// Default refresh token lifetime in days (`REFRESH_TTL_DAYS`).
    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_ttl_days: u64,
    /// Allowed CORS origins, comma separated; `*` allows all (`CORS_ORIGINS`).
    #[serde(
        default = "default_cors_origins",
        deserialize_with = "deserialize_comma_list"
    )]
    pub cors_origins: Vec<String>,
    /// Deployment environment name reported by `/health` (`ENV`).
    #[serde(default = "default_env")]
    pub env: String,
    /// Listen address (`HOST`).
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Listen port (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum pool connections (`DB_POOL_SIZE`).
    #[serde(default = "default_db_pool_size")]
    pub db_pool_size: u32,
    /// Pool acquire timeout in milliseconds (`DB_CONNECT_TIMEOUT_MS`).
    #[serde(default = "default_db_connect_timeout_ms")]
    pub db_connect_timeout_ms: u64,
    /// Apply embedded migrations at startup (`RUN_MIGRATIONS`).
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    /// Seconds between expired-token purges; `0` disables the job.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
    /// What `forget_user` does with a user's tokens (`USER_DELETION_POLICY`).
    #[serde(default)]
    pub user_deletion_policy: UserDeletionPolicy,
    /// Log filter used when `RUST_LOG` is unset (`LOG_LEVEL`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn deserialize_comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect())
}

fn default_access_ttl_min() -> u64 {
    15
}
fn default_refresh_ttl_days() -> u64 {
    30
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_env() -> String {
    "development".to_string()
}
fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_port() -> u16 {
    8000
}
fn default_db_pool_size() -> u32 {
    10
}
fn default_db_connect_timeout_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}
fn default_purge_interval_secs() -> u64 {
    3600
}
fn default_log_level() -> String {
    "info".to_string()
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field(
                "database_url",
                &tokenkeep_auth_postgres::pool::mask_password(&self.database_url),
            )
            .field("jwt_secret", &"****")
            .field("access_ttl_min", &self.access_ttl_min)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("cors_origins", &self.cors_origins)
            .field("env", &self.env)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_pool_size", &self.db_pool_size)
            .field("db_connect_timeout_ms", &self.db_connect_timeout_ms)
            .field("run_migrations", &self.run_migrations)
            .field("purge_interval_secs", &self.purge_interval_secs)
            .field("user_deletion_policy", &self.user_deletion_policy)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Settings {
    /// Checks ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.trim().is_empty() {
            return Err("DATABASE_URL must not be empty".into());
        }
        if self.jwt_secret.is_empty() {
            return Err(format!("JWT_SECRET: {}", ConfigError::EmptySecret));
        }
        if self.port == 0 {
            return Err("PORT must be > 0".into());
        }
        if self.db_pool_size == 0 {
            return Err("DB_POOL_SIZE must be > 0".into());
        }
        if self.purge_interval_secs > MAX_PURGE_INTERVAL_SECS {
            return Err(format!(
                "PURGE_INTERVAL_SECS must be <= {MAX_PURGE_INTERVAL_SECS}"
            ));
        }
        self.token_config()
            .and_then(|tokens| tokens.validate())
            .map_err(|e| e.to_string())?;

        if !self.cors_permissive() {
            for origin in &self.cors_origins {
                HeaderValue::from_str(origin)
                    .map_err(|_| format!("CORS_ORIGINS contains an invalid origin '{origin}'"))?;
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Token lifetimes and deletion policy for the lifecycle service.
    pub fn token_config(&self) -> Result<TokenConfig, ConfigError> {
        Ok(
            TokenConfig::from_minutes_and_days(self.access_ttl_min, self.refresh_ttl_days)?
                .with_user_deletion_policy(self.user_deletion_policy),
        )
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig::new(self.database_url.clone())
            .with_pool_size(self.db_pool_size)
            .with_connect_timeout_ms(self.db_connect_timeout_ms)
            .with_run_migrations(self.run_migrations)
    }

    pub fn purge_interval(&self) -> Option<Duration> {
        (self.purge_interval_secs > 0).then(|| Duration::from_secs(self.purge_interval_secs))
    }

    /// `true` when any origin is `*`; allows every origin.
    pub fn cors_permissive(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

pub mod loader {
    use super::Settings;
    use config::{Config, Environment, Map};

    // Values stay strings; serde parses the numeric and boolean fields, so
    // string settings such as `JWT_SECRET=007` are kept verbatim.
    fn environment() -> Environment {
        Environment::default()
    }

    fn build(env: Environment) -> Result<Settings, String> {
        let cfg = Config::builder()
            .add_source(env)
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let settings: Settings = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from the process environment.
    pub fn load_settings() -> Result<Settings, String> {
        build(environment())
    }

    /// Loads settings from an explicit variable map instead of the process
    /// environment. Keys use the same names as the environment variables.
    pub fn load_settings_from(vars: Map<String, String>) -> Result<Settings, String> {
        build(environment().source(Some(vars)))
    }
}
