use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers::{db_permission_from_row, db_role_from_row};
use crate::errors::{conflict_on_unique, AppError, AppResult};
use crate::models::rbac::{Permission, Role, RoleCreateRequest, RoleDetail, RoleFilter, RoleUpdateRequest};
use crate::store::{dedup_ids, membership, permissions};
use crate::utils::utc_now;

const ROLE_COLUMNS: &str = "id, name, display_name, description, is_system, priority, is_active, created_at, updated_at";
const MAX_NAME_LEN: usize = 50;

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
        return Err(AppError::bad_request(format!(
            "role name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn reject_system(role: &Role) -> AppResult<()> {
    if role.is_system {
        return Err(AppError::forbidden(format!("system role '{}' cannot be modified", role.name)));
    }
    Ok(())
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Role> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role {id} not found")))?;

    Ok(db_role_from_row(&row)?.into())
}

pub(crate) async fn fetch_by_name(conn: &mut SqliteConnection, name: &str) -> AppResult<Option<Role>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = ?");
    let row = sqlx::query(&sql).bind(name).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(db_role_from_row).transpose()?.map(Role::from))
}

/// Attaches the permission set and member count to `role`.
pub(crate) async fn role_detail(conn: &mut SqliteConnection, role: Role) -> AppResult<RoleDetail> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.name, p.display_name, p.description, p.resource, p.action, p.is_active, p.created_at, p.updated_at
        FROM permissions p
        JOIN role_permissions rp ON rp.permission_id = p.id
        WHERE rp.role_id = ?
        ORDER BY p.resource, p.action
        "#,
    )
    .bind(role.id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let permissions = rows
        .iter()
        .map(|row| db_permission_from_row(row).map(Permission::from))
        .collect::<AppResult<Vec<_>>>()?;

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_roles WHERE role_id = ?")
        .bind(role.id.to_string())
        .fetch_one(&mut *conn)
        .await?;

    Ok(RoleDetail { role, permissions, user_count })
}

async fn insert_edges(conn: &mut SqliteConnection, role_id: Uuid, permission_ids: &[Uuid]) -> AppResult<()> {
    let now = utc_now();
    for permission_id in permission_ids {
        sqlx::query("INSERT OR IGNORE INTO role_permissions (role_id, permission_id, created_at) VALUES (?, ?, ?)")
            .bind(role_id.to_string())
            .bind(permission_id.to_string())
            .bind(now)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn ensure_permissions_exist(conn: &mut SqliteConnection, permission_ids: &[Uuid]) -> AppResult<()> {
    for id in permission_ids {
        permissions::fetch(conn, *id).await?;
    }
    Ok(())
}

/// Overwrites the permission set of any role, system roles included.
///
/// Only the bootstrap seeder goes through here; every admin-facing path checks
/// the system flag first.
pub(crate) async fn replace_role_permissions(
    conn: &mut SqliteConnection,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> AppResult<()> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(role_id.to_string())
        .execute(&mut *conn)
        .await?;
    insert_edges(conn, role_id, &dedup_ids(permission_ids)).await
}

/// Inserts a system role. Only the bootstrap seeder creates these.
pub(crate) async fn insert_system(
    conn: &mut SqliteConnection,
    name: &str,
    display_name: &str,
    description: &str,
    priority: i64,
) -> AppResult<Role> {
    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO roles (id, name, display_name, description, is_system, priority, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 1, ?, 1, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(display_name)
    .bind(description)
    .bind(priority)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, "role name already exists"))?;

    fetch(conn, id).await
}

/// Creates a user-defined role. Roles created here are never system roles.
pub async fn create(pool: &SqlitePool, req: RoleCreateRequest) -> AppResult<RoleDetail> {
    let name = req.name.trim().to_string();
    validate_name(&name)?;
    let permission_ids = dedup_ids(&req.permission_ids);

    let mut tx = pool.begin().await?;

    if fetch_by_name(&mut tx, &name).await?.is_some() {
        return Err(AppError::conflict(format!("role '{name}' already exists")));
    }
    ensure_permissions_exist(&mut tx, &permission_ids).await?;

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO roles (id, name, display_name, description, is_system, priority, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&name)
    .bind(&req.display_name)
    .bind(&req.description)
    .bind(req.priority)
    .bind(req.is_active)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "role name already exists"))?;

    insert_edges(&mut tx, id, &permission_ids).await?;

    let role = fetch(&mut tx, id).await?;
    let detail = role_detail(&mut tx, role).await?;
    tx.commit().await?;

    tracing::info!(role = %detail.role.name, permissions = detail.permissions.len(), "role created");
    Ok(detail)
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> AppResult<Role> {
    let mut conn = pool.acquire().await?;
    fetch(&mut conn, id).await
}

pub async fn load_role_with_permissions(pool: &SqlitePool, id: Uuid) -> AppResult<RoleDetail> {
    let mut conn = pool.acquire().await?;
    let role = fetch(&mut conn, id).await?;
    role_detail(&mut conn, role).await
}

/// Roles ordered by priority (highest first), then name.
pub async fn list(pool: &SqlitePool, filter: &RoleFilter) -> AppResult<Vec<RoleDetail>> {
    let mut conn = pool.acquire().await?;

    let sql = format!(
        "SELECT {ROLE_COLUMNS} FROM roles WHERE (? IS NULL OR is_active = ?) ORDER BY priority DESC, name"
    );
    let rows = sqlx::query(&sql)
        .bind(filter.is_active)
        .bind(filter.is_active)
        .fetch_all(&mut *conn)
        .await?;

    let mut details = Vec::with_capacity(rows.len());
    for row in &rows {
        let role: Role = db_role_from_row(row)?.into();
        details.push(role_detail(&mut conn, role).await?);
    }
    Ok(details)
}

/// Applies a partial update. System roles accept `is_active` only.
///
/// Returns the role before the change and the updated detail.
pub async fn update(pool: &SqlitePool, id: Uuid, req: RoleUpdateRequest) -> AppResult<(Role, RoleDetail)> {
    let mut tx = pool.begin().await?;
    let before = fetch(&mut tx, id).await?;

    if req.touches_definition() {
        reject_system(&before)?;
    }

    let name = match req.name.as_deref().map(str::trim) {
        Some(name) if name != before.name => {
            validate_name(name)?;
            if fetch_by_name(&mut tx, name).await?.is_some() {
                return Err(AppError::conflict(format!("role '{name}' already exists")));
            }
            Some(name.to_string())
        }
        _ => None,
    };

    let admins_before = membership::admin_count(&mut tx).await?;

    sqlx::query(
        "UPDATE roles SET name = COALESCE(?, name), display_name = COALESCE(?, display_name), \
         description = COALESCE(?, description), priority = COALESCE(?, priority), \
         is_active = COALESCE(?, is_active), updated_at = ? WHERE id = ?",
    )
    .bind(name)
    .bind(req.display_name)
    .bind(req.description)
    .bind(req.priority)
    .bind(req.is_active)
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "role name already exists"))?;

    membership::ensure_admin_remains(&mut tx, admins_before).await?;

    let role = fetch(&mut tx, id).await?;
    let detail = role_detail(&mut tx, role).await?;
    tx.commit().await?;

    Ok((before, detail))
}

/// Deletes a user-defined role together with its user and permission edges.
pub async fn delete(pool: &SqlitePool, id: Uuid) -> AppResult<Role> {
    let mut tx = pool.begin().await?;
    let role = fetch(&mut tx, id).await?;
    reject_system(&role)?;

    let admins_before = membership::admin_count(&mut tx).await?;

    sqlx::query("DELETE FROM user_roles WHERE role_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    membership::ensure_admin_remains(&mut tx, admins_before).await?;
    tx.commit().await?;

    tracing::info!(role = %role.name, "role deleted");
    Ok(role)
}

/// Replaces the permission set of a user-defined role with exactly `permission_ids`.
pub async fn set_permissions(pool: &SqlitePool, role_id: Uuid, permission_ids: &[Uuid]) -> AppResult<RoleDetail> {
    let permission_ids = dedup_ids(permission_ids);
    let mut tx = pool.begin().await?;

    let role = fetch(&mut tx, role_id).await?;
    reject_system(&role)?;
    ensure_permissions_exist(&mut tx, &permission_ids).await?;

    let admins_before = membership::admin_count(&mut tx).await?;
    replace_role_permissions(&mut tx, role_id, &permission_ids).await?;
    membership::ensure_admin_remains(&mut tx, admins_before).await?;

    let detail = role_detail(&mut tx, role).await?;
    tx.commit().await?;
    Ok(detail)
}

pub async fn add_permission(pool: &SqlitePool, role_id: Uuid, permission_id: Uuid) -> AppResult<RoleDetail> {
    let mut tx = pool.begin().await?;

    let role = fetch(&mut tx, role_id).await?;
    reject_system(&role)?;
    permissions::fetch(&mut tx, permission_id).await?;

    insert_edges(&mut tx, role_id, &[permission_id]).await?;

    let detail = role_detail(&mut tx, role).await?;
    tx.commit().await?;
    Ok(detail)
}

pub async fn remove_permission(pool: &SqlitePool, role_id: Uuid, permission_id: Uuid) -> AppResult<RoleDetail> {
    let mut tx = pool.begin().await?;

    let role = fetch(&mut tx, role_id).await?;
    reject_system(&role)?;
    permissions::fetch(&mut tx, permission_id).await?;

    let admins_before = membership::admin_count(&mut tx).await?;
    sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .execute(&mut *tx)
        .await?;
    membership::ensure_admin_remains(&mut tx, admins_before).await?;

    let detail = role_detail(&mut tx, role).await?;
    tx.commit().await?;
    Ok(detail)
}
