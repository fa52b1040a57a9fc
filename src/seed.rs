//! Bootstrap catalog: default permissions, system roles and the configured superadmin.
//!
//! Seeding is idempotent and runs in a single transaction. Existing permissions
//! and roles are never recreated; system role permission sets are rewritten
//! from the catalog on every run.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::roles as role_names;
use crate::config::SuperadminConfig;
use crate::db::row_parsers::parse_uuid;
use crate::errors::{AppError, AppResult};
use crate::events::{activity_event, persist_event};
use crate::models::rbac::PermissionCreateRequest;
use crate::models::user::{NewUser, User};
use crate::store::{permissions, principals, roles};
use crate::utils::hash_password;

pub struct PermissionSeed {
    pub resource: &'static str,
    pub action: &'static str,
    pub display_name: &'static str,
}

pub enum RoleGrants {
    /// Every permission present in the registry when the seed runs.
    All,
    Only(&'static [&'static str]),
}

pub struct RoleSeed {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub priority: i64,
    pub grants: RoleGrants,
}

pub const DEFAULT_PERMISSIONS: &[PermissionSeed] = &[
    PermissionSeed { resource: "users", action: "read", display_name: "View Users" },
    PermissionSeed { resource: "users", action: "create", display_name: "Create Users" },
    PermissionSeed { resource: "users", action: "update", display_name: "Update Users" },
    PermissionSeed { resource: "users", action: "delete", display_name: "Delete Users" },
    PermissionSeed { resource: "roles", action: "read", display_name: "View Roles" },
    PermissionSeed { resource: "roles", action: "create", display_name: "Create Roles" },
    PermissionSeed { resource: "roles", action: "update", display_name: "Update Roles" },
    PermissionSeed { resource: "roles", action: "delete", display_name: "Delete Roles" },
    PermissionSeed { resource: "settings", action: "read", display_name: "View Settings" },
    PermissionSeed { resource: "settings", action: "update", display_name: "Update Settings" },
    PermissionSeed { resource: "admin", action: "access", display_name: "Admin Panel Access" },
];

pub const DEFAULT_ROLES: &[RoleSeed] = &[
    RoleSeed {
        name: role_names::SUPERADMIN,
        display_name: "Super Admin",
        description: "Full system control",
        priority: 100,
        grants: RoleGrants::All,
    },
    RoleSeed {
        name: role_names::ADMIN,
        display_name: "Administrator",
        description: "Administrative access",
        priority: 0,
        grants: RoleGrants::Only(&[
            "users:read",
            "users:create",
            "users:update",
            "users:delete",
            "roles:read",
            "roles:create",
            "roles:update",
            "roles:delete",
            "settings:read",
            "settings:update",
            "admin:access",
        ]),
    },
    RoleSeed {
        name: role_names::USER,
        display_name: "Standard User",
        description: "Regular user with basic access",
        priority: 0,
        grants: RoleGrants::Only(&[]),
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub superadmin_created: bool,
}

pub async fn run_seed(pool: &SqlitePool, superadmin: Option<&SuperadminConfig>) -> AppResult<SeedReport> {
    let mut report = SeedReport::default();
    let mut tx = pool.begin().await?;

    for seed in DEFAULT_PERMISSIONS {
        let name = format!("{}:{}", seed.resource, seed.action);
        if permissions::fetch_by_name(&mut tx, &name).await?.is_some() {
            continue;
        }

        let req = PermissionCreateRequest {
            name,
            display_name: seed.display_name.to_string(),
            description: None,
            resource: seed.resource.to_string(),
            action: seed.action.to_string(),
            is_active: true,
        };
        permissions::insert(&mut tx, &req).await?;
        report.permissions_created += 1;
    }

    for seed in DEFAULT_ROLES {
        let role = match roles::fetch_by_name(&mut tx, seed.name).await? {
            Some(role) => role,
            None => {
                report.roles_created += 1;
                roles::insert_system(&mut tx, seed.name, seed.display_name, seed.description, seed.priority).await?
            }
        };

        let permission_ids: Vec<Uuid> = match seed.grants {
            RoleGrants::All => {
                let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM permissions ORDER BY resource, action")
                    .fetch_all(&mut *tx)
                    .await?;
                ids.iter().map(|id| parse_uuid(id)).collect::<AppResult<_>>()?
            }
            RoleGrants::Only(names) => {
                let mut ids = Vec::with_capacity(names.len());
                for name in names {
                    let permission = permissions::fetch_by_name(&mut tx, name)
                        .await?
                        .ok_or_else(|| AppError::internal(format!("catalog permission '{name}' missing")))?;
                    ids.push(permission.id);
                }
                ids
            }
        };

        roles::replace_role_permissions(&mut tx, role.id, &permission_ids).await?;
    }

    if let Some(config) = superadmin {
        if principals::fetch_by_email(&mut tx, &config.email).await?.is_none() {
            let new_user = superadmin_user(config)?;
            let user = principals::insert(&mut tx, &new_user, role_names::SUPERADMIN).await?;
            tracing::info!(email = %user.email, "superadmin provisioned");
            report.superadmin_created = true;
        }
    }

    tx.commit().await?;

    tracing::info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        superadmin_created = report.superadmin_created,
        "bootstrap seed complete"
    );
    Ok(report)
}

fn superadmin_user(config: &SuperadminConfig) -> AppResult<NewUser> {
    Ok(NewUser {
        email: config.email.clone(),
        password_hash: hash_password(&config.password)?,
        first_name: config.first_name.clone(),
        last_name: config.last_name.clone(),
        email_verified: true,
        is_superadmin: true,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    Created,
    Promoted,
    AlreadySuperadmin,
}

/// Creates a superadmin account, or promotes an existing account with that email.
/// An existing account keeps its password.
pub async fn create_admin(pool: &SqlitePool, config: &SuperadminConfig) -> AppResult<(User, AdminOutcome)> {
    let mut tx = pool.begin().await?;

    let outcome = match principals::fetch_by_email(&mut tx, &config.email).await? {
        Some(existing) if existing.is_superadmin => AdminOutcome::AlreadySuperadmin,
        Some(existing) => {
            principals::promote(&mut tx, existing.id, role_names::SUPERADMIN).await?;
            AdminOutcome::Promoted
        }
        None => {
            let new_user = superadmin_user(config)?;
            principals::insert(&mut tx, &new_user, role_names::SUPERADMIN).await?;
            AdminOutcome::Created
        }
    };

    let user = principals::fetch_by_email(&mut tx, &config.email)
        .await?
        .ok_or_else(|| AppError::internal("superadmin vanished"))?;
    tx.commit().await?;

    Ok((user.into(), outcome))
}

/// Writes the audit row for a `create_admin` outcome directly to the activity
/// log, since the command line runs without an event bus.
pub async fn record_admin_outcome(pool: &SqlitePool, user: &User, outcome: &AdminOutcome) -> AppResult<()> {
    let action = match outcome {
        AdminOutcome::Created => "registered",
        AdminOutcome::Promoted => "promoted",
        AdminOutcome::AlreadySuperadmin => return Ok(()),
    };

    persist_event(pool, &activity_event(action, None, user, None, None)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::PermissionName;

    #[test]
    fn catalog_names_are_canonical() {
        for seed in DEFAULT_PERMISSIONS {
            assert!(PermissionName::new(seed.resource, seed.action).is_ok());
        }
    }

    #[test]
    fn admin_grants_are_all_in_catalog() {
        let catalog: Vec<String> = DEFAULT_PERMISSIONS
            .iter()
            .map(|s| format!("{}:{}", s.resource, s.action))
            .collect();

        for role in DEFAULT_ROLES {
            if let RoleGrants::Only(names) = role.grants {
                for name in names {
                    assert!(catalog.iter().any(|c| c == name), "{name} not in catalog");
                }
            }
        }
    }
}
