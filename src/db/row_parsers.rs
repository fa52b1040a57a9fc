use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rbac::{DbPermission, DbRole};
use crate::models::reset_token::ResetToken;
use crate::models::user::DbUser;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339, which is what sqlx writes for DateTime<Utc>
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP: "YYYY-MM-DD HH:MM:SS" with optional fraction
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

pub fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid '{}': {}", s, e)))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

fn uuid_column(row: &SqliteRow, name: &str) -> Result<Uuid, AppError> {
    let raw: String = column(row, name)?;
    parse_uuid(&raw)
}

fn datetime_column(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, AppError> {
    let raw: String = column(row, name)?;
    parse_datetime(&raw)
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    Ok(DbUser {
        id: uuid_column(row, "id")?,
        email: column(row, "email")?,
        password_hash: column(row, "password_hash")?,
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
        email_verified: column(row, "email_verified")?,
        is_active: column(row, "is_active")?,
        is_superadmin: column(row, "is_superadmin")?,
        created_at: datetime_column(row, "created_at")?,
        updated_at: datetime_column(row, "updated_at")?,
    })
}

pub fn db_permission_from_row(row: &SqliteRow) -> Result<DbPermission, AppError> {
    Ok(DbPermission {
        id: uuid_column(row, "id")?,
        name: column(row, "name")?,
        display_name: column(row, "display_name")?,
        description: column(row, "description")?,
        resource: column(row, "resource")?,
        action: column(row, "action")?,
        is_active: column(row, "is_active")?,
        created_at: datetime_column(row, "created_at")?,
        updated_at: datetime_column(row, "updated_at")?,
    })
}

pub fn db_role_from_row(row: &SqliteRow) -> Result<DbRole, AppError> {
    Ok(DbRole {
        id: uuid_column(row, "id")?,
        name: column(row, "name")?,
        display_name: column(row, "display_name")?,
        description: column(row, "description")?,
        is_system: column(row, "is_system")?,
        priority: column(row, "priority")?,
        is_active: column(row, "is_active")?,
        created_at: datetime_column(row, "created_at")?,
        updated_at: datetime_column(row, "updated_at")?,
    })
}

pub fn reset_token_from_row(row: &SqliteRow) -> Result<ResetToken, AppError> {
    let used_at: Option<String> = column(row, "used_at")?;

    Ok(ResetToken {
        id: uuid_column(row, "id")?,
        user_id: uuid_column(row, "user_id")?,
        token: column(row, "token")?,
        expires_at: datetime_column(row, "expires_at")?,
        used: column(row, "used")?,
        used_at: parse_opt_datetime(used_at)?,
        created_at: datetime_column(row, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_rfc3339_and_sqlite_formats() {
        let a = parse_datetime("2025-03-01T10:00:00Z").unwrap();
        let b = parse_datetime("2025-03-01 10:00:00").unwrap();
        let c = parse_datetime("2025-03-01T10:00:00.000000+00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("yesterday").is_err());
        assert!(parse_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn blank_optional_datetime_is_none() {
        assert_eq!(parse_opt_datetime(Some("  ".into())).unwrap(), None);
        assert_eq!(parse_opt_datetime(None).unwrap(), None);
    }
}
