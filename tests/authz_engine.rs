use anyhow::Result;
use uuid::Uuid;

use warden::authz::{DefaultPolicyEvaluator, PolicyEvaluator, Principal};
use warden::models::rbac::{Permission, PermissionCreateRequest, RoleCreateRequest, RoleUpdateRequest};
use warden::store::{membership, permissions, principals, roles};

mod common;

async fn permission(pool: &sqlx::SqlitePool, resource: &str, action: &str) -> Result<Permission> {
    Ok(permissions::create(
        pool,
        PermissionCreateRequest {
            name: format!("{resource}:{action}"),
            display_name: format!("{resource} {action}"),
            description: None,
            resource: resource.to_string(),
            action: action.to_string(),
            is_active: true,
        },
    )
    .await?)
}

async fn role(pool: &sqlx::SqlitePool, name: &str, permission_ids: Vec<Uuid>) -> Result<Uuid> {
    let detail = roles::create(
        pool,
        RoleCreateRequest {
            name: name.to_string(),
            display_name: name.to_string(),
            description: None,
            priority: 0,
            is_active: true,
            permission_ids,
        },
    )
    .await?;
    Ok(detail.role.id)
}

async fn load(pool: &sqlx::SqlitePool, user_id: Uuid) -> Result<Principal> {
    principals::load_principal_with_roles(pool, user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("principal {user_id} missing"))
}

#[tokio::test]
async fn effective_permissions_are_the_union_of_roles() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let read = permission(&pool, "reports", "read").await?;
    let write = permission(&pool, "reports", "write").await?;

    let reader = role(&pool, "reader", vec![read.id]).await?;
    let editor = role(&pool, "editor", vec![read.id, write.id]).await?;

    let user_id = common::insert_user(&pool, "union@example.com").await?;
    membership::set_roles(&pool, user_id, &[reader, editor], None).await?;

    let principal = load(&pool, user_id).await?;
    let effective: Vec<String> = principal.effective_permissions().into_iter().collect();
    assert_eq!(effective, vec!["reports:read".to_string(), "reports:write".to_string()]);
    assert_eq!(principal.role_names(), vec!["editor".to_string(), "reader".to_string()]);
    Ok(())
}

#[tokio::test]
async fn deactivating_a_role_withdraws_its_permissions() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let export = permission(&pool, "reports", "export").await?;
    let exporter = role(&pool, "exporter", vec![export.id]).await?;

    let user_id = common::insert_user(&pool, "exporter@example.com").await?;
    membership::add_role(&pool, user_id, exporter, None).await?;

    let policy = DefaultPolicyEvaluator::new();
    assert!(policy.can(&load(&pool, user_id).await?, "reports:export").await);

    roles::update(&pool, exporter, RoleUpdateRequest { is_active: Some(false), ..Default::default() }).await?;

    let principal = load(&pool, user_id).await?;
    assert!(!principal.has_permission("reports:export"));
    assert!(!policy.can(&principal, "reports:export").await);
    assert!(principal.role_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn deactivating_a_permission_withdraws_it_from_every_holder() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let audit = permission(&pool, "audit", "read").await?;
    let auditor = role(&pool, "auditor", vec![audit.id]).await?;

    let user_id = common::insert_user(&pool, "auditor@example.com").await?;
    membership::add_role(&pool, user_id, auditor, None).await?;

    permissions::update(
        &pool,
        audit.id,
        warden::models::rbac::PermissionUpdateRequest { is_active: Some(false), ..Default::default() },
    )
    .await?;

    assert!(!load(&pool, user_id).await?.has_permission("audit:read"));
    Ok(())
}

#[tokio::test]
async fn superadmin_is_allowed_anything_without_roles() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let user_id = common::insert_user(&pool, "root@example.com").await?;
    principals::set_flags(&pool, user_id, None, Some(true)).await?;

    let principal = load(&pool, user_id).await?;
    let policy = DefaultPolicyEvaluator::new();
    assert!(principal.roles.is_empty());
    assert!(policy.can(&principal, "anything:whatsoever").await);
    assert!(policy.can_all(&principal, &["a:b", "c:d"]).await);
    Ok(())
}

#[tokio::test]
async fn inactive_principal_is_denied_even_as_superadmin() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let keeper = common::insert_user(&pool, "keeper@example.com").await?;
    principals::set_flags(&pool, keeper, None, Some(true)).await?;

    let user_id = common::insert_user(&pool, "dormant@example.com").await?;
    principals::set_flags(&pool, user_id, Some(false), Some(true)).await?;

    let principal = load(&pool, user_id).await?;
    assert!(!DefaultPolicyEvaluator::new().can(&principal, "users:read").await);
    Ok(())
}

#[tokio::test]
async fn unknown_principal_loads_as_none() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    assert!(principals::load_principal_with_roles(&pool, Uuid::new_v4()).await?.is_none());
    Ok(())
}
