//! Token lifecycle configuration.
//!
//! [`TokenConfig`] is built once at process start (usually from the server
//! settings) and handed to [`RefreshTokenService`](crate::RefreshTokenService)
//! by reference.
//!
//! # Example (TOML)
//!
//! ```toml
//! access_token_lifetime = "15m"
//! refresh_token_lifetime = "30d"
//! user_deletion_policy = "cascade"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors raised by configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A lifetime was zero.
    #[error("{field} must be greater than zero")]
    ZeroLifetime {
        /// The offending field.
        field: &'static str,
    },

    /// A lifetime exceeded its upper bound or overflowed.
    #[error("{field} must be at most {max_secs} seconds")]
    LifetimeTooLarge {
        /// The offending field.
        field: &'static str,
        /// Largest accepted value, in seconds.
        max_secs: u64,
    },

    /// The signing secret is missing.
    #[error("signing secret must not be empty")]
    EmptySecret,

    /// A user deletion policy string was not recognised.
    #[error("unknown user deletion policy '{0}' (expected 'cascade' or 'revoke')")]
    UnknownDeletionPolicy(String),
}

/// Longest accepted access token lifetime (1 day).
pub const MAX_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 3600);

/// Longest accepted refresh token lifetime (10 years).
pub const MAX_REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(3650 * 24 * 3600);

/// What happens to a user's refresh tokens when the user is deleted.
///
/// The `refresh_tokens.user_id` foreign key has no `ON DELETE` action, so the
/// user row cannot be removed while tokens still reference it. User management
/// calls [`RefreshTokenService::forget_user`](crate::RefreshTokenService::forget_user)
/// first, and this policy decides what that call does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserDeletionPolicy {
    /// Delete every token row owned by the user.
    #[default]
    Cascade,
    /// Revoke every token and keep the rows until retention cleanup.
    Revoke,
}

impl std::str::FromStr for UserDeletionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" => Ok(Self::Cascade),
            "revoke" => Ok(Self::Revoke),
            other => Err(ConfigError::UnknownDeletionPolicy(other.to_string())),
        }
    }
}

/// Token lifetimes and store-level policies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Default refresh token lifetime used by `issue_default`/`rotate_default`.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Policy applied by `forget_user`.
    pub user_deletion_policy: UserDeletionPolicy,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(15 * 60), // 15 minutes
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            user_deletion_policy: UserDeletionPolicy::Cascade,
        }
    }
}

impl TokenConfig {
    /// Builds a config from the `ACCESS_TTL_MIN` / `REFRESH_TTL_DAYS` units.
    ///
    /// # Errors
    ///
    /// Returns `LifetimeTooLarge` if a value does not fit in seconds.
    pub fn from_minutes_and_days(
        access_ttl_min: u64,
        refresh_ttl_days: u64,
    ) -> Result<Self, ConfigError> {
        let access_secs = access_ttl_min
            .checked_mul(60)
            .ok_or(ConfigError::LifetimeTooLarge {
                field: "access_token_lifetime",
                max_secs: MAX_ACCESS_TOKEN_LIFETIME.as_secs(),
            })?;
        let refresh_secs = refresh_ttl_days
            .checked_mul(24 * 3600)
            .ok_or(ConfigError::LifetimeTooLarge {
                field: "refresh_token_lifetime",
                max_secs: MAX_REFRESH_TOKEN_LIFETIME.as_secs(),
            })?;
        Ok(Self {
            access_token_lifetime: Duration::from_secs(access_secs),
            refresh_token_lifetime: Duration::from_secs(refresh_secs),
            ..Self::default()
        })
    }

    /// Sets the user deletion policy.
    #[must_use]
    pub fn with_user_deletion_policy(mut self, policy: UserDeletionPolicy) -> Self {
        self.user_deletion_policy = policy;
        self
    }

    /// Validates lifetimes.
    ///
    /// # Errors
    ///
    /// Returns an error if either lifetime is zero or above its maximum.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_lifetime.is_zero() {
            return Err(ConfigError::ZeroLifetime {
                field: "access_token_lifetime",
            });
        }
        if self.refresh_token_lifetime.is_zero() {
            return Err(ConfigError::ZeroLifetime {
                field: "refresh_token_lifetime",
            });
        }
        if self.access_token_lifetime > MAX_ACCESS_TOKEN_LIFETIME {
            return Err(ConfigError::LifetimeTooLarge {
                field: "access_token_lifetime",
                max_secs: MAX_ACCESS_TOKEN_LIFETIME.as_secs(),
            });
        }
        if self.refresh_token_lifetime > MAX_REFRESH_TOKEN_LIFETIME {
            return Err(ConfigError::LifetimeTooLarge {
                field: "refresh_token_lifetime",
                max_secs: MAX_REFRESH_TOKEN_LIFETIME.as_secs(),
            });
        }
        Ok(())
    }

    /// Default refresh TTL as a signed `time::Duration`.
    #[must_use]
    pub fn refresh_ttl(&self) -> time::Duration {
        to_time_duration(self.refresh_token_lifetime)
    }

    /// Access TTL as a signed `time::Duration`.
    #[must_use]
    pub fn access_ttl(&self) -> time::Duration {
        to_time_duration(self.access_token_lifetime)
    }
}

fn to_time_duration(d: Duration) -> time::Duration {
    time::Duration::try_from(d).unwrap_or(time::Duration::MAX)
}
