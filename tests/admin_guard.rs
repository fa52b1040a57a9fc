use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use warden::errors::AppError;
use warden::models::rbac::{PermissionFilter, PermissionUpdateRequest, RoleFilter, RoleUpdateRequest};
use warden::store::{membership, permissions, principals, roles};

mod common;

async fn role_id(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    roles::list(pool, &RoleFilter::default())
        .await?
        .into_iter()
        .find(|d| d.role.name == name)
        .map(|d| d.role.id)
        .ok_or_else(|| anyhow::anyhow!("role {name} missing"))
}

/// One active user holding the seeded `admin` role, nobody else with access.
async fn lone_admin(pool: &SqlitePool) -> Result<(Uuid, Uuid)> {
    warden::seed::run_seed(pool, None).await?;
    let admin_role = role_id(pool, "admin").await?;
    let user_id = common::insert_user(pool, "lone@example.com").await?;
    membership::add_role(pool, user_id, admin_role, None).await?;
    Ok((user_id, admin_role))
}

fn is_forbidden<T>(result: Result<T, AppError>) -> bool {
    matches!(result, Err(AppError::Forbidden(_)))
}

#[tokio::test]
async fn last_admin_cannot_lose_the_admin_role() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let (user_id, admin_role) = lone_admin(&pool).await?;

    assert!(is_forbidden(membership::remove_role(&pool, user_id, admin_role).await));
    assert!(is_forbidden(membership::set_roles(&pool, user_id, &[], None).await));

    let held: Vec<String> = membership::roles_of(&pool, user_id)
        .await?
        .into_iter()
        .map(|d| d.role.name)
        .collect();
    assert!(held.contains(&"admin".to_string()));
    Ok(())
}

#[tokio::test]
async fn last_admin_cannot_be_deactivated() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let (user_id, admin_role) = lone_admin(&pool).await?;

    assert!(is_forbidden(principals::set_flags(&pool, user_id, Some(false), None).await));
    assert!(is_forbidden(
        roles::update(&pool, admin_role, RoleUpdateRequest { is_active: Some(false), ..Default::default() }).await
    ));

    let gate = permissions::list(&pool, &PermissionFilter { resource: Some("admin".into()), is_active: None })
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("admin:access missing"))?;
    assert!(is_forbidden(
        permissions::update(&pool, gate.id, PermissionUpdateRequest { is_active: Some(false), ..Default::default() }).await
    ));
    assert!(is_forbidden(permissions::delete(&pool, gate.id).await));

    let still = principals::find_by_id(&pool, user_id).await?.expect("user");
    assert!(still.is_active);
    Ok(())
}

#[tokio::test]
async fn access_can_move_once_another_admin_exists() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let (user_id, admin_role) = lone_admin(&pool).await?;

    let successor = common::insert_user(&pool, "successor@example.com").await?;
    principals::set_flags(&pool, successor, None, Some(true)).await?;

    assert!(membership::remove_role(&pool, user_id, admin_role).await?);
    Ok(())
}

#[tokio::test]
async fn guard_is_silent_when_no_admin_existed() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    warden::seed::run_seed(&pool, None).await?;
    let user_id = common::insert_user(&pool, "plain@example.com").await?;

    let (_, after) = principals::set_flags(&pool, user_id, Some(false), None).await?;
    assert!(!after.is_active);
    Ok(())
}
