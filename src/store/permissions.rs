use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers::db_permission_from_row;
use crate::errors::{conflict_on_unique, AppError, AppResult};
use crate::models::rbac::{Permission, PermissionCreateRequest, PermissionFilter, PermissionName, PermissionUpdateRequest};
use crate::store::membership;
use crate::utils::utc_now;

const PERMISSION_COLUMNS: &str =
    "id, name, display_name, description, resource, action, is_active, created_at, updated_at";

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Permission> {
    let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("permission {id} not found")))?;

    Ok(db_permission_from_row(&row)?.into())
}

pub(crate) async fn fetch_by_name(conn: &mut SqliteConnection, name: &str) -> AppResult<Option<Permission>> {
    let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = ?");
    let row = sqlx::query(&sql).bind(name).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(db_permission_from_row).transpose()?.map(Permission::from))
}

async fn pair_exists(conn: &mut SqliteConnection, resource: &str, action: &str) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM permissions WHERE resource = ? AND action = ?")
        .bind(resource)
        .bind(action)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// Inserts a permission inside the caller's transaction.
///
/// The name must equal `resource:action`; name and pair are each checked for
/// duplicates before the write.
pub(crate) async fn insert(conn: &mut SqliteConnection, req: &PermissionCreateRequest) -> AppResult<Permission> {
    let canonical = PermissionName::new(&req.resource, &req.action)?;
    if req.name != canonical.as_str() {
        return Err(AppError::bad_request(format!(
            "permission name '{}' does not match resource:action '{}'",
            req.name, canonical
        )));
    }
    if req.display_name.trim().is_empty() {
        return Err(AppError::bad_request("display_name must not be empty"));
    }

    if fetch_by_name(conn, canonical.as_str()).await?.is_some() {
        return Err(AppError::conflict(format!("permission '{canonical}' already exists")));
    }
    if pair_exists(conn, canonical.resource(), canonical.action()).await? {
        return Err(AppError::conflict(format!(
            "permission for resource '{}' and action '{}' already exists",
            canonical.resource(),
            canonical.action()
        )));
    }

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO permissions (id, name, display_name, description, resource, action, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(canonical.as_str())
    .bind(&req.display_name)
    .bind(&req.description)
    .bind(canonical.resource())
    .bind(canonical.action())
    .bind(req.is_active)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, "permission already exists"))?;

    fetch(conn, id).await
}

pub async fn create(pool: &SqlitePool, req: PermissionCreateRequest) -> AppResult<Permission> {
    let mut tx = pool.begin().await?;
    let permission = insert(&mut tx, &req).await?;
    tx.commit().await?;

    tracing::info!(permission = %permission.name, "permission created");
    Ok(permission)
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> AppResult<Permission> {
    let mut conn = pool.acquire().await?;
    fetch(&mut conn, id).await
}

/// Permissions ordered by resource, then action.
pub async fn list(pool: &SqlitePool, filter: &PermissionFilter) -> AppResult<Vec<Permission>> {
    let sql = format!(
        "SELECT {PERMISSION_COLUMNS} FROM permissions \
         WHERE (? IS NULL OR resource = ?) AND (? IS NULL OR is_active = ?) \
         ORDER BY resource, action"
    );
    let rows = sqlx::query(&sql)
        .bind(&filter.resource)
        .bind(&filter.resource)
        .bind(filter.is_active)
        .bind(filter.is_active)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| db_permission_from_row(row).map(Permission::from))
        .collect()
}

/// Changes display metadata and the active flag only.
///
/// Returns the permission before and after the change.
pub async fn update(pool: &SqlitePool, id: Uuid, req: PermissionUpdateRequest) -> AppResult<(Permission, Permission)> {
    if matches!(req.display_name.as_deref(), Some(name) if name.trim().is_empty()) {
        return Err(AppError::bad_request("display_name must not be empty"));
    }

    let mut tx = pool.begin().await?;
    let before = fetch(&mut tx, id).await?;
    let admins_before = membership::admin_count(&mut tx).await?;

    sqlx::query(
        "UPDATE permissions SET display_name = COALESCE(?, display_name), description = COALESCE(?, description), \
         is_active = COALESCE(?, is_active), updated_at = ? WHERE id = ?",
    )
    .bind(req.display_name)
    .bind(req.description)
    .bind(req.is_active)
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    membership::ensure_admin_remains(&mut tx, admins_before).await?;

    let after = fetch(&mut tx, id).await?;
    tx.commit().await?;
    Ok((before, after))
}

/// Deletes a permission and detaches it from every role in one transaction.
pub async fn delete(pool: &SqlitePool, id: Uuid) -> AppResult<Permission> {
    let mut tx = pool.begin().await?;
    let permission = fetch(&mut tx, id).await?;
    let admins_before = membership::admin_count(&mut tx).await?;

    let detached = sqlx::query("DELETE FROM role_permissions WHERE permission_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM permissions WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    membership::ensure_admin_remains(&mut tx, admins_before).await?;
    tx.commit().await?;

    tracing::info!(permission = %permission.name, roles_detached = detached, "permission deleted");
    Ok(permission)
}

pub async fn list_resources(pool: &SqlitePool) -> AppResult<Vec<String>> {
    Ok(sqlx::query_scalar("SELECT DISTINCT resource FROM permissions ORDER BY resource")
        .fetch_all(pool)
        .await?)
}

pub async fn list_actions(pool: &SqlitePool) -> AppResult<Vec<String>> {
    Ok(sqlx::query_scalar("SELECT DISTINCT action FROM permissions ORDER BY action")
        .fetch_all(pool)
        .await?)
}
