use std::collections::BTreeSet;

use uuid::Uuid;

/// Wildcard reported as the effective permission set of a superadmin.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub name: String,
    pub active: bool,
}

/// One role held by a principal, with the permissions attached to it at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub name: String,
    pub active: bool,
    pub permissions: Vec<PermissionGrant>,
}

impl RoleGrant {
    pub fn new(name: impl Into<String>, permissions: &[&str]) -> Self {
        Self {
            name: name.into(),
            active: true,
            permissions: permissions
                .iter()
                .map(|p| PermissionGrant { name: p.to_string(), active: true })
                .collect(),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    fn active_permissions(&self) -> impl Iterator<Item = &str> {
        self.permissions
            .iter()
            .filter(|p| p.active)
            .map(|p| p.name.as_str())
    }
}

/// Snapshot of an authenticated user and everything the engine needs to decide
/// on their requests. Built once per request; never cached across requests.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub active: bool,
    pub superadmin: bool,
    pub roles: Vec<RoleGrant>,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            email: String::new(),
            active: true,
            superadmin: false,
            roles: Vec::new(),
        }
    }

    pub fn with_superadmin(mut self, superadmin: bool) -> Self {
        self.superadmin = superadmin;
        self
    }

    pub fn with_role(mut self, role: RoleGrant) -> Self {
        self.roles.push(role);
        self
    }

    pub fn is_superadmin(&self) -> bool {
        self.superadmin
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.superadmin || self.active_roles().any(|r| r.name == name)
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.superadmin
            || self
                .active_roles()
                .any(|r| r.active_permissions().any(|p| p == name))
    }

    pub fn has_any_permission(&self, names: &[&str]) -> bool {
        self.superadmin || names.iter().any(|n| self.has_permission(n))
    }

    pub fn has_all_permissions(&self, names: &[&str]) -> bool {
        self.superadmin || names.iter().all(|n| self.has_permission(n))
    }

    /// Union of active permissions over active roles; `{"*"}` for a superadmin.
    pub fn effective_permissions(&self) -> BTreeSet<String> {
        if self.superadmin {
            return BTreeSet::from([WILDCARD.to_string()]);
        }

        self.active_roles()
            .flat_map(|r| r.active_permissions())
            .map(str::to_string)
            .collect()
    }

    /// Names of the active roles, sorted.
    pub fn role_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.active_roles().map(|r| r.name.as_str()).collect();
        names.into_iter().map(str::to_string).collect()
    }

    fn active_roles(&self) -> impl Iterator<Item = &RoleGrant> {
        self.roles.iter().filter(|r| r.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superadmin_has_everything_without_roles() {
        let p = Principal::new(Uuid::new_v4()).with_superadmin(true);
        assert!(p.has_permission("anything:at_all"));
        assert!(p.has_role("no_such_role"));
        assert!(p.has_all_permissions(&["a:x", "b:y"]));
        assert_eq!(p.effective_permissions(), BTreeSet::from(["*".to_string()]));
    }

    #[test]
    fn effective_permissions_are_a_union() {
        let p = Principal::new(Uuid::new_v4())
            .with_role(RoleGrant::new("reader", &["a:read"]))
            .with_role(RoleGrant::new("writer", &["a:read", "a:write"]));

        let expected: BTreeSet<String> = ["a:read", "a:write"].iter().map(|s| s.to_string()).collect();
        assert_eq!(p.effective_permissions(), expected);
    }

    #[test]
    fn inactive_role_grants_nothing() {
        let p = Principal::new(Uuid::new_v4()).with_role(RoleGrant::new("editor", &["posts:update"]).inactive());

        assert!(!p.has_permission("posts:update"));
        assert!(!p.has_role("editor"));
        assert!(p.effective_permissions().is_empty());
        assert!(p.role_names().is_empty());
    }

    #[test]
    fn inactive_permission_is_skipped() {
        let mut role = RoleGrant::new("editor", &["posts:update", "posts:read"]);
        role.permissions[0].active = false;
        let p = Principal::new(Uuid::new_v4()).with_role(role);

        assert!(!p.has_permission("posts:update"));
        assert!(p.has_permission("posts:read"));
    }

    #[test]
    fn any_and_all() {
        let p = Principal::new(Uuid::new_v4()).with_role(RoleGrant::new("r", &["a:read"]));

        assert!(p.has_any_permission(&["a:write", "a:read"]));
        assert!(!p.has_all_permissions(&["a:write", "a:read"]));
        assert!(!p.has_any_permission(&[]));
        assert!(p.has_all_permissions(&[]));
    }
}
