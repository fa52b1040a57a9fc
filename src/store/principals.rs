use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::authz::{roles, PermissionGrant, Principal, RoleGrant};
use crate::db::row_parsers::{db_user_from_row, parse_uuid};
use crate::errors::{conflict_on_unique, AppError, AppResult};
use crate::models::user::{DbUser, NewUser, User};
use crate::store::membership;
use crate::utils::utc_now;

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, email_verified, is_active, is_superadmin, created_at, updated_at";

/// Registers a principal with the default `user` role.
pub async fn create(pool: &SqlitePool, new_user: NewUser) -> AppResult<User> {
    let mut tx = pool.begin().await?;
    let user = insert(&mut tx, &new_user, roles::USER).await?;
    tx.commit().await?;
    Ok(user.into())
}

/// Inserts a principal inside the caller's transaction and grants it
/// `role_name` when a role of that name exists.
pub(crate) async fn insert(conn: &mut SqliteConnection, new_user: &NewUser, role_name: &str) -> AppResult<DbUser> {
    if fetch_by_email(conn, &new_user.email).await?.is_some() {
        return Err(AppError::conflict("email already in use"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, email_verified, is_active, is_superadmin, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&new_user.email)
    .bind(&new_user.password_hash)
    .bind(&new_user.first_name)
    .bind(&new_user.last_name)
    .bind(new_user.email_verified)
    .bind(new_user.is_superadmin)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| conflict_on_unique(e, "email already in use"))?;

    sqlx::query(
        "INSERT INTO user_roles (user_id, role_id, assigned_at, assigned_by) \
         SELECT ?, id, ?, NULL FROM roles WHERE name = ?",
    )
    .bind(id.to_string())
    .bind(now)
    .bind(role_name)
    .execute(&mut *conn)
    .await?;

    fetch_by_id(conn, id)
        .await?
        .ok_or_else(|| AppError::internal("inserted user vanished"))
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let mut conn = pool.acquire().await?;
    fetch_by_email(&mut conn, email).await
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> AppResult<Option<DbUser>> {
    let mut conn = pool.acquire().await?;
    fetch_by_id(&mut conn, id).await
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> AppResult<User> {
    find_by_id(pool, id)
        .await?
        .map(User::from)
        .ok_or_else(|| AppError::not_found("user not found"))
}

pub(crate) async fn fetch_by_email(conn: &mut SqliteConnection, email: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    let row = sqlx::query(&sql).bind(email).fetch_optional(&mut *conn).await?;
    row.as_ref().map(db_user_from_row).transpose()
}

pub(crate) async fn fetch_by_id(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(db_user_from_row).transpose()
}

/// Loads a principal together with every role and role permission in one query.
///
/// Inactive roles and permissions are included with their flags so the engine,
/// not the query, decides what they grant.
pub async fn load_principal_with_roles(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<Principal>> {
    let rows = sqlx::query(
        r#"
        SELECT u.id, u.email, u.is_active, u.is_superadmin,
               r.name AS role_name, r.is_active AS role_active,
               p.name AS permission_name, p.is_active AS permission_active
        FROM users u
        LEFT JOIN user_roles ur ON ur.user_id = u.id
        LEFT JOIN roles r ON r.id = ur.role_id
        LEFT JOIN role_permissions rp ON rp.role_id = r.id
        LEFT JOIN permissions p ON p.id = rp.permission_id
        WHERE u.id = ?
        ORDER BY r.name, p.name
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    let Some(first) = rows.first() else {
        return Ok(None);
    };

    let id: String = first.try_get("id")?;
    let mut principal = Principal {
        user_id: parse_uuid(&id)?,
        email: first.try_get("email")?,
        active: first.try_get("is_active")?,
        superadmin: first.try_get("is_superadmin")?,
        roles: Vec::new(),
    };

    for row in &rows {
        let Some(role_name) = row.try_get::<Option<String>, _>("role_name")? else {
            continue;
        };

        let starts_new_role = principal.roles.last().map(|r| r.name != role_name).unwrap_or(true);
        if starts_new_role {
            principal.roles.push(RoleGrant {
                name: role_name,
                active: row.try_get("role_active")?,
                permissions: Vec::new(),
            });
        }

        if let Some(permission_name) = row.try_get::<Option<String>, _>("permission_name")? {
            let active: bool = row.try_get("permission_active")?;
            if let Some(role) = principal.roles.last_mut() {
                role.permissions.push(PermissionGrant { name: permission_name, active });
            }
        }
    }

    Ok(Some(principal))
}

/// Replaces the stored hash of an existing principal.
pub async fn change_password(pool: &SqlitePool, user_id: Uuid, password_hash: &str, now: DateTime<Utc>) -> AppResult<User> {
    let mut tx = pool.begin().await?;
    update_password_hash(&mut tx, user_id, password_hash, now).await?;
    let user = fetch_by_id(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    tx.commit().await?;
    Ok(user.into())
}

pub(crate) async fn update_password_hash(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    password_hash: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(now)
        .bind(user_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("user not found"));
    }
    Ok(())
}

/// Updates the administrative flags of a principal.
///
/// Returns the user before and after. Rolls back with `Forbidden` when the change
/// would leave no active principal with administrative access.
pub async fn set_flags(
    pool: &SqlitePool,
    user_id: Uuid,
    is_active: Option<bool>,
    is_superadmin: Option<bool>,
) -> AppResult<(User, User)> {
    let mut tx = pool.begin().await?;

    let before = fetch_by_id(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    let admins_before = membership::admin_count(&mut tx).await?;

    sqlx::query(
        "UPDATE users SET is_active = COALESCE(?, is_active), is_superadmin = COALESCE(?, is_superadmin), updated_at = ? WHERE id = ?",
    )
    .bind(is_active)
    .bind(is_superadmin)
    .bind(utc_now())
    .bind(user_id.to_string())
    .execute(&mut *tx)
    .await?;

    membership::ensure_admin_remains(&mut tx, admins_before).await?;

    let after = fetch_by_id(&mut tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, is_active = after.is_active, is_superadmin = after.is_superadmin, "user flags updated");
    Ok((before.into(), after.into()))
}

/// Sets the superadmin flag and grants `role_name` if that role exists.
/// Never touches an account's other roles.
pub(crate) async fn promote(conn: &mut SqliteConnection, user_id: Uuid, role_name: &str) -> AppResult<()> {
    let now = utc_now();

    sqlx::query("UPDATE users SET is_superadmin = 1, is_active = 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(user_id.to_string())
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO user_roles (user_id, role_id, assigned_at, assigned_by) \
         SELECT ?, id, ?, NULL FROM roles WHERE name = ?",
    )
    .bind(user_id.to_string())
    .bind(now)
    .bind(role_name)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
