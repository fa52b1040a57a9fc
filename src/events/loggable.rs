use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an activity row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Authorization and credential changes; never trimmed
    Critical,
    #[default]
    Important,
    /// High-volume events such as logins
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// An entity that can be published to the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of the event name, as in `role.created`.
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "revoked" | "replaced" | "consumed" | "password_changed" | "promoted" => Severity::Critical,
            "login" => Severity::Noise,
            _ => self.severity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Widget;

    impl Loggable for Widget {
        fn entity_type() -> &'static str { "widget" }
        fn subject_id(&self) -> Uuid { Uuid::nil() }
    }

    #[test]
    fn destructive_actions_escalate() {
        assert_eq!(Widget.severity_for_action("deleted"), Severity::Critical);
        assert_eq!(Widget.severity_for_action("revoked"), Severity::Critical);
        assert_eq!(Widget.severity_for_action("created"), Severity::Important);
        assert_eq!(Widget.severity_for_action("login"), Severity::Noise);
        assert_eq!(Severity::Noise.as_str(), "noise");
    }
}
