use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::parse_env_ttl_minutes;
use crate::errors::AppError;

const DEFAULT_EXP_MINUTES: i64 = 24 * 60;

/// Message shared by every session-token rejection.
const INVALID_TOKEN: &str = "invalid or expired token";

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_minutes: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("exp_minutes", &self.exp_minutes)
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>, exp_minutes: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            exp_minutes,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        if secret.is_empty() {
            return Err(AppError::configuration("JWT_SECRET must not be empty"));
        }
        let exp_minutes = parse_env_ttl_minutes("JWT_EXP_MINUTES", DEFAULT_EXP_MINUTES)?;

        Ok(Self::new(secret.into_bytes(), exp_minutes))
    }

    pub fn encode(&self, user_id: Uuid) -> Result<String, AppError> {
        use chrono::{Duration, Utc};

        let now = Utc::now();
        let exp = Duration::try_minutes(self.exp_minutes)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AppError::internal("session token expiry out of range"))?;

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    /// Verifies signature and expiry together.
    ///
    /// Expired, tampered and malformed tokens all come back as the same
    /// `AppError::Token`; only the debug log records which one it was.
    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "expired",
                    ErrorKind::InvalidSignature => "bad_signature",
                    _ => "malformed",
                };
                tracing::debug!(reason, "session token rejected");
                AppError::token(INVALID_TOKEN)
            })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::token(INVALID_TOKEN))
    }
}

/// Identity carried by a valid bearer token. Says nothing about whether the
/// account is still active; see `authz::CurrentPrincipal` for that.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let claims = state.config.jwt.decode(token)?;

        Ok(AuthUser {
            user_id: claims.user_id()?,
        })
    }
}
