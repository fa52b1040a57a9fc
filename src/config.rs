//! Environment-driven settings.
//!
//! Every value is read once at startup and handed to the components that need
//! it; nothing here is consulted lazily from a global.

use chrono::Duration;

use crate::errors::AppError;
use crate::jwt::JwtConfig;

const DEFAULT_RESET_EXPIRE_MINUTES: i64 = 30;

/// Upper bound for any lifetime setting: one leap year.
pub const MAX_TTL_MINUTES: i64 = 527_040;

#[derive(Debug, Clone)]
pub struct ResetConfig {
    pub expire_minutes: i64,
    /// Base URL of the frontend, used to build reset links in notices.
    pub app_url: String,
}

impl ResetConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let expire_minutes = parse_env_ttl_minutes("PASSWORD_RESET_EXPIRE_MINUTES", DEFAULT_RESET_EXPIRE_MINUTES)?;

        let app_url = std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self { expire_minutes, app_url })
    }

    pub fn ttl(&self) -> Result<Duration, AppError> {
        Duration::try_minutes(self.expire_minutes)
            .ok_or_else(|| AppError::internal("password reset lifetime out of range"))
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            expire_minutes: DEFAULT_RESET_EXPIRE_MINUTES,
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

/// The one superadmin account provisioned by the bootstrap seeder.
#[derive(Clone)]
pub struct SuperadminConfig {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl std::fmt::Debug for SuperadminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuperadminConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

impl SuperadminConfig {
    /// Returns `None` when `SUPERADMIN_EMAIL` is unset, which disables provisioning.
    pub fn from_env() -> Result<Option<Self>, AppError> {
        let email = match std::env::var("SUPERADMIN_EMAIL") {
            Ok(email) if !email.trim().is_empty() => email.trim().to_string(),
            _ => return Ok(None),
        };

        let password = std::env::var("SUPERADMIN_PASSWORD")
            .map_err(|_| AppError::configuration("SUPERADMIN_PASSWORD must be set when SUPERADMIN_EMAIL is"))?;

        Ok(Some(Self {
            email,
            password,
            first_name: std::env::var("SUPERADMIN_FIRST_NAME").unwrap_or_else(|_| "Super".to_string()),
            last_name: std::env::var("SUPERADMIN_LAST_NAME").unwrap_or_else(|_| "Admin".to_string()),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    pub reset: ResetConfig,
    pub superadmin: Option<SuperadminConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            jwt: JwtConfig::from_env()?,
            reset: ResetConfig::from_env()?,
            superadmin: SuperadminConfig::from_env()?,
        })
    }
}

pub(crate) fn parse_env_i64(key: &str, default: i64) -> Result<i64, AppError> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::configuration(format!("{key} must be a valid integer"))),
        Err(_) => Ok(default),
    }
}

/// Reads a lifetime in minutes, rejecting values outside `1..=MAX_TTL_MINUTES`.
pub(crate) fn parse_env_ttl_minutes(key: &str, default: i64) -> Result<i64, AppError> {
    check_ttl_minutes(key, parse_env_i64(key, default)?)
}

fn check_ttl_minutes(key: &str, minutes: i64) -> Result<i64, AppError> {
    if (1..=MAX_TTL_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(AppError::configuration(format!("{key} must be between 1 and {MAX_TTL_MINUTES} minutes")))
    }
}
