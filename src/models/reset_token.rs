use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

/// A single-use password reset token.
///
/// `token` is the secret handed to the user out of band. It is deliberately
/// skipped when the struct is serialized, so audit payloads never carry it.
#[derive(Debug, Clone, Serialize)]
pub struct ResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ResetToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl Loggable for ResetToken {
    fn entity_type() -> &'static str { "password_reset" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Important }
}
