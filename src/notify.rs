use async_trait::async_trait;

use crate::errors::AppError;

/// What a principal needs to complete a password reset.
#[derive(Clone)]
pub struct ResetNotice {
    pub email: String,
    pub display_name: String,
    pub token: String,
    pub expire_minutes: i64,
    pub reset_url: String,
}

impl std::fmt::Debug for ResetNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetNotice")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("token", &"<redacted>")
            .field("expire_minutes", &self.expire_minutes)
            .finish()
    }
}

impl ResetNotice {
    pub fn new(email: String, display_name: String, token: String, expire_minutes: i64, app_url: &str) -> Self {
        let reset_url = format!("{}/reset-password?token={}", app_url.trim_end_matches('/'), token);
        Self {
            email,
            display_name,
            token,
            expire_minutes,
            reset_url,
        }
    }
}

/// Out-of-band delivery of reset tokens.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_password_reset(&self, notice: ResetNotice) -> Result<(), AppError>;
}

/// Writes a log line instead of sending mail. The token itself is never logged.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_password_reset(&self, notice: ResetNotice) -> Result<(), AppError> {
        tracing::info!(
            email = %notice.email,
            expire_minutes = notice.expire_minutes,
            "password reset notice ready for delivery"
        );
        Ok(())
    }
}
