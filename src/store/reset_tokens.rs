//! Single-use, time-bounded password reset tokens.
//!
//! At most one unused token exists per principal: issuing a new one deletes
//! the others. Consumption marks the token used with a conditional update
//! before anything else happens in its transaction, so concurrent consumers
//! serialize on the database write lock and only one of them sees the row.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers::{parse_datetime, parse_uuid, reset_token_from_row};
use crate::errors::{AppError, AppResult};
use crate::models::reset_token::ResetToken;
use crate::store::principals;
use crate::utils::{hash_password, random_token};

const TOKEN_COLUMNS: &str = "id, user_id, token, expires_at, used, used_at, created_at";

pub async fn issue(pool: &SqlitePool, user_id: Uuid, ttl: Duration, now: DateTime<Utc>) -> AppResult<ResetToken> {
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::internal("reset token expiry out of range"))?;

    let mut tx = pool.begin().await?;

    let superseded = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = ? AND used = 0")
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let id = Uuid::new_v4();
    let token = random_token();
    sqlx::query(
        "INSERT INTO password_reset_tokens (id, user_id, token, expires_at, used, used_at, created_at) VALUES (?, ?, ?, ?, 0, NULL, ?)",
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(&token)
    .bind(expires_at)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let sql = format!("SELECT {TOKEN_COLUMNS} FROM password_reset_tokens WHERE id = ?");
    let row = sqlx::query(&sql).bind(id.to_string()).fetch_one(&mut *tx).await?;
    let issued = reset_token_from_row(&row)?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, superseded, "password reset token issued");
    Ok(issued)
}

/// Read-only check. Returns the owning principal of a usable token.
pub async fn validate(pool: &SqlitePool, token: &str, now: DateTime<Utc>) -> AppResult<Uuid> {
    let sql = format!("SELECT {TOKEN_COLUMNS} FROM password_reset_tokens WHERE token = ?");
    let row = sqlx::query(&sql)
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("reset token not found"))?;
    let stored = reset_token_from_row(&row)?;

    if stored.used {
        return Err(AppError::already_consumed("reset token already used"));
    }
    if stored.is_expired_at(now) {
        return Err(AppError::expired("reset token expired"));
    }
    Ok(stored.user_id)
}

/// Spends `token` and sets the owner's password to `new_password`.
///
/// Fails with `NotFound`, `AlreadyConsumed` or `Expired`; on failure nothing
/// is written, an expired token stays unused.
pub async fn consume(pool: &SqlitePool, token: &str, new_password: &str, now: DateTime<Utc>) -> AppResult<ResetToken> {
    let password_hash = hash_password(new_password)?;

    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(
        "UPDATE password_reset_tokens SET used = 1, used_at = ? WHERE token = ? AND used = 0 RETURNING id, user_id, expires_at",
    )
    .bind(now)
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = claimed else {
        drop(tx);
        return Err(classify_unclaimable(pool, token).await);
    };

    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let expires_at: String = row.try_get("expires_at")?;
    let (id, user_id, expires_at) = (parse_uuid(&id)?, parse_uuid(&user_id)?, parse_datetime(&expires_at)?);

    if now > expires_at {
        tx.rollback().await?;
        return Err(AppError::expired("reset token expired"));
    }

    principals::update_password_hash(&mut tx, user_id, &password_hash, now).await?;

    let sql = format!("SELECT {TOKEN_COLUMNS} FROM password_reset_tokens WHERE id = ?");
    let row = sqlx::query(&sql).bind(id.to_string()).fetch_one(&mut *tx).await?;
    let consumed = reset_token_from_row(&row)?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, "password reset token consumed");
    Ok(consumed)
}

/// Explains why the conditional update matched nothing.
async fn classify_unclaimable(pool: &SqlitePool, token: &str) -> AppError {
    let used: Result<Option<bool>, sqlx::Error> = sqlx::query_scalar("SELECT used FROM password_reset_tokens WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await;

    match used {
        Ok(Some(_)) => AppError::already_consumed("reset token already used"),
        Ok(None) => AppError::not_found("reset token not found"),
        Err(err) => AppError::Database(err),
    }
}
