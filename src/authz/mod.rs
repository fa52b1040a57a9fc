//! Authorization engine.
//!
//! Decisions are made on a [`Principal`] snapshot loaded once per request:
//! - superadmin flag bypasses every check
//! - otherwise a permission is held when an active role carries it and the
//!   permission itself is active
//! - no deny rules; role priority is informational only

mod evaluator;
mod extract;
mod principal;

pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use extract::CurrentPrincipal;
pub use principal::{PermissionGrant, Principal, RoleGrant, WILDCARD};

use crate::errors::AppError;

/// Well-known role names
pub mod roles {
    pub const SUPERADMIN: &str = "superadmin";
    pub const ADMIN: &str = "admin";
    pub const USER: &str = "user";
}

/// Well-known permission names
pub mod permissions {
    pub const USERS_READ: &str = "users:read";
    pub const USERS_CREATE: &str = "users:create";
    pub const USERS_UPDATE: &str = "users:update";
    pub const USERS_DELETE: &str = "users:delete";

    pub const ROLES_READ: &str = "roles:read";
    pub const ROLES_CREATE: &str = "roles:create";
    pub const ROLES_UPDATE: &str = "roles:update";
    pub const ROLES_DELETE: &str = "roles:delete";

    pub const SETTINGS_READ: &str = "settings:read";
    pub const SETTINGS_UPDATE: &str = "settings:update";

    /// Gate for every administrative endpoint.
    pub const ADMIN_ACCESS: &str = "admin:access";
}

fn quoted(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn require_permission(
    policy: &dyn PolicyEvaluator,
    principal: &Principal,
    permission: &str,
) -> Result<(), AppError> {
    if policy.can(principal, permission).await {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("permission denied: '{permission}' required")))
    }
}

pub async fn require_any_permission(
    policy: &dyn PolicyEvaluator,
    principal: &Principal,
    permissions: &[&str],
) -> Result<(), AppError> {
    if policy.can_any(principal, permissions).await {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "permission denied: one of {} required",
            quoted(permissions)
        )))
    }
}

/// Fails naming every permission the principal lacks.
pub async fn require_all_permissions(
    policy: &dyn PolicyEvaluator,
    principal: &Principal,
    permissions: &[&str],
) -> Result<(), AppError> {
    let mut missing = Vec::new();
    for permission in permissions {
        if !policy.can(principal, permission).await {
            missing.push(*permission);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("permission denied: {} required", quoted(&missing))))
    }
}

pub async fn require_role(policy: &dyn PolicyEvaluator, principal: &Principal, role: &str) -> Result<(), AppError> {
    if policy.has_role(principal, role).await {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("role '{role}' required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn denial_names_the_missing_permission() {
        let policy = DefaultPolicyEvaluator::new();
        let principal = Principal::new(Uuid::new_v4()).with_role(RoleGrant::new("r", &[permissions::ADMIN_ACCESS]));

        let err = require_all_permissions(&policy, &principal, &[permissions::ADMIN_ACCESS, permissions::ROLES_DELETE])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(err.to_string().contains("'roles:delete'"));
        assert!(!err.to_string().contains("'admin:access'"));
    }

    #[tokio::test]
    async fn require_helpers_pass_when_held() {
        let policy = DefaultPolicyEvaluator::new();
        let principal = Principal::new(Uuid::new_v4()).with_role(RoleGrant::new(roles::ADMIN, &[permissions::USERS_READ]));

        assert!(require_permission(&policy, &principal, permissions::USERS_READ).await.is_ok());
        assert!(require_any_permission(&policy, &principal, &[permissions::USERS_UPDATE, permissions::USERS_READ]).await.is_ok());
        assert!(require_role(&policy, &principal, roles::ADMIN).await.is_ok());
        assert!(require_role(&policy, &principal, roles::SUPERADMIN).await.is_err());
    }
}
