use async_trait::async_trait;

use super::principal::Principal;

/// Pluggable authorization decisions.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn can(&self, principal: &Principal, permission: &str) -> bool;

    async fn can_any(&self, principal: &Principal, permissions: &[&str]) -> bool {
        for permission in permissions {
            if self.can(principal, permission).await {
                return true;
            }
        }
        false
    }

    async fn can_all(&self, principal: &Principal, permissions: &[&str]) -> bool {
        for permission in permissions {
            if !self.can(principal, permission).await {
                return false;
            }
        }
        true
    }

    async fn has_role(&self, principal: &Principal, role: &str) -> bool {
        principal.has_role(role)
    }
}

/// Standard role-based evaluation.
///
/// Evaluation order:
/// 1. inactive principal -> deny
/// 2. superadmin flag -> allow
/// 3. any active role holding the active permission -> allow
/// 4. deny
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEvaluator for DefaultPolicyEvaluator {
    async fn can(&self, principal: &Principal, permission: &str) -> bool {
        if !principal.active {
            tracing::debug!(user_id = %principal.user_id, permission = %permission, "inactive principal denied");
            return false;
        }

        if principal.is_superadmin() {
            tracing::debug!(user_id = %principal.user_id, permission = %permission, "superadmin bypass");
            return true;
        }

        if principal.has_permission(permission) {
            tracing::debug!(user_id = %principal.user_id, permission = %permission, "role permission match");
            return true;
        }

        tracing::debug!(user_id = %principal.user_id, permission = %permission, "permission denied");
        false
    }

    async fn has_role(&self, principal: &Principal, role: &str) -> bool {
        principal.active && principal.has_role(role)
    }
}
