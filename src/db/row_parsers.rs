use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::relation::{CircleRelation, Membership};
use crate::models::restaurant::Restaurant;
use crate::models::user::{DbUser, Role};

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // sqlx writes "YYYY-MM-DD HH:MM:SS.f+00:00"; CURRENT_TIMESTAMP has no offset
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

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
    match s.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(Some(parse_datetime(trimmed)?)),
        _ => Ok(None),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}

fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, AppError> {
    s.as_deref().map(parse_uuid).transpose()
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

/// Parses a user row. Unknown role text surfaces as `InvalidRole`, which
/// callers treat as a denial.
pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    let id: String = column(row, "id")?;
    let role: String = column(row, "role")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let deleted_at: Option<String> = column(row, "deleted_at")?;

    Ok(DbUser {
        id: parse_uuid(&id)?,
        name: column(row, "name")?,
        email: column(row, "email")?,
        password_hash: column(row, "password_hash")?,
        role: role.parse::<Role>()?,
        job_title: column(row, "job_title")?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
        deleted_at: parse_opt_datetime(deleted_at)?,
    })
}

pub fn restaurant_from_row(row: &SqliteRow) -> Result<Restaurant, AppError> {
    let id: String = column(row, "id")?;
    let owner_user_id: Option<String> = column(row, "owner_user_id")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let deleted_at: Option<String> = column(row, "deleted_at")?;

    Ok(Restaurant {
        id: parse_uuid(&id)?,
        name: column(row, "name")?,
        owner_user_id: parse_opt_uuid(owner_user_id)?,
        active: column(row, "active")?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
        deleted_at: parse_opt_datetime(deleted_at)?,
    })
}

pub fn membership_from_row(row: &SqliteRow) -> Result<Membership, AppError> {
    let user_id: String = column(row, "user_id")?;
    let restaurant_id: String = column(row, "restaurant_id")?;
    let added_by: Option<String> = column(row, "added_by_user_id")?;
    let created_at: String = column(row, "created_at")?;

    Ok(Membership {
        user_id: parse_uuid(&user_id)?,
        restaurant_id: parse_uuid(&restaurant_id)?,
        added_by_user_id: parse_opt_uuid(added_by)?,
        created_at: parse_datetime(&created_at)?,
    })
}

pub fn circle_relation_from_row(row: &SqliteRow) -> Result<CircleRelation, AppError> {
    let lead_id: String = column(row, "lead_id")?;
    let black_shirt_id: String = column(row, "black_shirt_id")?;
    let created_at: String = column(row, "created_at")?;

    Ok(CircleRelation {
        lead_id: parse_uuid(&lead_id)?,
        black_shirt_id: parse_uuid(&black_shirt_id)?,
        created_at: parse_datetime(&created_at)?,
    })
}
