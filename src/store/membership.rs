use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::authz::permissions::ADMIN_ACCESS;
use crate::db::row_parsers::{parse_datetime, parse_uuid};
use crate::errors::{AppError, AppResult};
use crate::models::rbac::{RoleDetail, UserRole};
use crate::store::{dedup_ids, principals, roles};
use crate::utils::utc_now;

/// Number of active principals that currently hold administrative access,
/// through the superadmin flag or an active role carrying active `admin:access`.
pub(crate) async fn admin_count(conn: &mut SqliteConnection) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM users u
        WHERE u.is_active = 1
          AND (u.is_superadmin = 1 OR EXISTS (
                SELECT 1 FROM user_roles ur
                JOIN roles r ON r.id = ur.role_id AND r.is_active = 1
                JOIN role_permissions rp ON rp.role_id = r.id
                JOIN permissions p ON p.id = rp.permission_id AND p.is_active = 1
                WHERE ur.user_id = u.id AND p.name = ?
          ))
        "#,
    )
    .bind(ADMIN_ACCESS)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count)
}

/// Fails when a change inside the current transaction took the administrator
/// count from non-zero to zero. Callers roll back by dropping the transaction.
pub(crate) async fn ensure_admin_remains(conn: &mut SqliteConnection, admins_before: i64) -> AppResult<()> {
    if admins_before == 0 {
        return Ok(());
    }

    if admin_count(conn).await? == 0 {
        tracing::warn!("refused change that would remove the last administrator");
        return Err(AppError::forbidden("change would leave no active administrator"));
    }
    Ok(())
}

async fn ensure_user_exists(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<()> {
    principals::fetch_by_id(conn, user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("user not found"))
}

/// Replaces the full role set of a user. System roles may be granted here.
///
/// Returns the stored role ids, deduplicated in request order.
pub async fn set_roles(
    pool: &SqlitePool,
    user_id: Uuid,
    role_ids: &[Uuid],
    assigned_by: Option<Uuid>,
) -> AppResult<Vec<Uuid>> {
    let role_ids = dedup_ids(role_ids);
    let mut tx = pool.begin().await?;

    ensure_user_exists(&mut tx, user_id).await?;
    for role_id in &role_ids {
        roles::fetch(&mut tx, *role_id).await?;
    }

    let admins_before = admin_count(&mut tx).await?;

    sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

    let now = utc_now();
    for role_id in &role_ids {
        sqlx::query("INSERT INTO user_roles (user_id, role_id, assigned_at, assigned_by) VALUES (?, ?, ?, ?)")
            .bind(user_id.to_string())
            .bind(role_id.to_string())
            .bind(now)
            .bind(assigned_by.map(|id| id.to_string()))
            .execute(&mut *tx)
            .await?;
    }

    ensure_admin_remains(&mut tx, admins_before).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, roles = role_ids.len(), "user roles replaced");
    Ok(role_ids)
}

/// Grants one role. Granting a role the user already holds leaves the existing
/// assignment untouched.
pub async fn add_role(
    pool: &SqlitePool,
    user_id: Uuid,
    role_id: Uuid,
    assigned_by: Option<Uuid>,
) -> AppResult<UserRole> {
    let mut tx = pool.begin().await?;

    ensure_user_exists(&mut tx, user_id).await?;
    roles::fetch(&mut tx, role_id).await?;

    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id, assigned_at, assigned_by) VALUES (?, ?, ?, ?)")
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .bind(utc_now())
        .bind(assigned_by.map(|id| id.to_string()))
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query("SELECT user_id, role_id, assigned_at, assigned_by FROM user_roles WHERE user_id = ? AND role_id = ?")
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    let assigned_at: String = row.try_get("assigned_at")?;
    let assigned_by: Option<String> = row.try_get("assigned_by")?;
    Ok(UserRole {
        user_id,
        role_id,
        assigned_by: assigned_by.as_deref().map(parse_uuid).transpose()?,
        assigned_at: parse_datetime(&assigned_at)?,
    })
}

/// Revokes one role. Returns false when the user did not hold it.
pub async fn remove_role(pool: &SqlitePool, user_id: Uuid, role_id: Uuid) -> AppResult<bool> {
    let mut tx = pool.begin().await?;

    ensure_user_exists(&mut tx, user_id).await?;
    roles::fetch(&mut tx, role_id).await?;

    let admins_before = admin_count(&mut tx).await?;

    let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .execute(&mut *tx)
        .await?;

    ensure_admin_remains(&mut tx, admins_before).await?;
    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

/// Roles held by a user, each with its permissions and member count,
/// highest priority first.
pub async fn roles_of(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<RoleDetail>> {
    let mut conn = pool.acquire().await?;
    ensure_user_exists(&mut conn, user_id).await?;

    let role_ids: Vec<String> = sqlx::query_scalar(
        "SELECT r.id FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = ? ORDER BY r.priority DESC, r.name",
    )
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut details = Vec::with_capacity(role_ids.len());
    for id in role_ids {
        let role = roles::fetch(&mut conn, parse_uuid(&id)?).await?;
        details.push(roles::role_detail(&mut conn, role).await?);
    }
    Ok(details)
}
