use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

// =============================================================================
// PERMISSION NAME
// =============================================================================

/// A permission name in canonical `resource:action` form.
///
/// Both halves are lowercase identifiers (`[a-z0-9_]`, starting with a letter).
/// The only way to build one is through [`PermissionName::parse`] or
/// [`PermissionName::new`], so a value of this type always agrees with its own
/// resource and action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PermissionName(String);

impl PermissionName {
    pub fn new(resource: &str, action: &str) -> Result<Self, AppError> {
        validate_part("resource", resource)?;
        validate_part("action", action)?;
        Ok(Self(format!("{resource}:{action}")))
    }

    pub fn parse(name: &str) -> Result<Self, AppError> {
        let (resource, action) = name
            .split_once(':')
            .ok_or_else(|| AppError::bad_request(format!("permission name '{name}' must be in resource:action form")))?;
        Self::new(resource, action)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resource(&self) -> &str {
        self.0.split_once(':').map(|(r, _)| r).unwrap_or_default()
    }

    pub fn action(&self) -> &str {
        self.0.split_once(':').map(|(_, a)| a).unwrap_or_default()
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PermissionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_part(label: &str, part: &str) -> Result<(), AppError> {
    let mut chars = part.chars();
    let starts_with_letter = chars.next().map(|c| c.is_ascii_lowercase()).unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if part.len() > 50 || !starts_with_letter || !rest_ok {
        return Err(AppError::bad_request(format!(
            "permission {label} '{part}' must be a lowercase identifier"
        )));
    }
    Ok(())
}

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Permission {
    pub id: Uuid,
    #[schema(example = "users:read")]
    pub name: String,
    #[schema(example = "View Users")]
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[schema(example = "users")]
    pub resource: String,
    #[schema(example = "read")]
    pub action: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone)]
pub struct DbPermission {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPermission> for Permission {
    fn from(db: DbPermission) -> Self {
        Permission {
            id: db.id,
            name: db.name,
            display_name: db.display_name,
            description: db.description,
            resource: db.resource,
            action: db.action,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PermissionCreateRequest {
    #[schema(example = "reports:export")]
    pub name: String,
    #[schema(example = "Export Reports")]
    pub display_name: String,
    pub description: Option<String>,
    #[schema(example = "reports")]
    pub resource: String,
    #[schema(example = "export")]
    pub action: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Only display metadata and the active flag can change after creation.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PermissionUpdateRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionFilter {
    pub resource: Option<String>,
    pub is_active: Option<bool>,
}

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Role {
    pub id: Uuid,
    #[schema(example = "support")]
    pub name: String,
    #[schema(example = "Support Staff")]
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_system: bool,
    pub priority: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone)]
pub struct DbRole {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub priority: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbRole> for Role {
    fn from(db: DbRole) -> Self {
        Role {
            id: db.id,
            name: db.name,
            display_name: db.display_name,
            description: db.description,
            is_system: db.is_system,
            priority: db.priority,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// A role together with its permission set and member count.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub user_count: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "support")]
    pub name: String,
    #[schema(example = "Support Staff")]
    pub display_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

/// Unknown fields are rejected, so a system-role update cannot smuggle in
/// anything besides `is_active`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub is_active: Option<bool>,
}

impl RoleUpdateRequest {
    /// True when the request touches anything besides `is_active`.
    pub fn touches_definition(&self) -> bool {
        self.name.is_some() || self.display_name.is_some() || self.description.is_some() || self.priority.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoleFilter {
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRolePermissionsRequest {
    pub permission_ids: Vec<Uuid>,
}

// =============================================================================
// USER-ROLE ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
}

impl Loggable for UserRole {
    fn entity_type() -> &'static str { "user_role" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// The full role set of one user, as written by a replace.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserRoleSet {
    pub user_id: Uuid,
    pub role_ids: Vec<Uuid>,
}

impl Loggable for UserRoleSet {
    fn entity_type() -> &'static str { "user_roles" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetUserRolesRequest {
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRolesResponse {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub roles: Vec<RoleDetail>,
}

// =============================================================================
// ROLE-PERMISSION ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
}

impl Loggable for RolePermission {
    fn entity_type() -> &'static str { "role_permission" }
    fn subject_id(&self) -> Uuid { self.role_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// The full permission set of one role, as written by a replace.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RolePermissionSet {
    pub role_id: Uuid,
    pub permission_ids: Vec<Uuid>,
}

impl Loggable for RolePermissionSet {
    fn entity_type() -> &'static str { "role_permissions" }
    fn subject_id(&self) -> Uuid { self.role_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

// =============================================================================
// CATALOG LISTINGS
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceList {
    pub resources: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionList {
    pub actions: Vec<String>,
}

fn default_true() -> bool {
    true
}
