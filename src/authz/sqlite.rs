use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::models::relation::Membership;
use crate::models::user::{Role, User};
use crate::utils::utc_now;

use super::store::{IdentityStore, RelationshipStore};

/// SQLite-backed identity and relationship store.
///
/// Pair uniqueness is a table constraint; inserts go through `INSERT OR IGNORE`
/// so two racing identical grants both succeed and leave one row.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        let row = sqlx::query(
            "SELECT id, name, email, password_hash, role, job_title, created_at, updated_at, deleted_at FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

        Ok(row_parsers::db_user_from_row(&row)?.into())
    }
}

#[async_trait]
impl RelationshipStore for SqliteStore {
    async fn has_membership(&self, user_id: Uuid, restaurant_id: Uuid) -> AppResult<bool> {
        let found: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM restaurant_memberships WHERE user_id = ? AND restaurant_id = ?
            ) OR EXISTS(
                SELECT 1 FROM users WHERE id = ? AND role = ? AND deleted_at IS NULL
            )
            "#,
        )
        .bind(user_id.to_string())
        .bind(restaurant_id.to_string())
        .bind(user_id.to_string())
        .bind(Role::Admin.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(found != 0)
    }

    async fn is_in_circle(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM circle_relations WHERE lead_id = ? AND black_shirt_id = ?)",
        )
        .bind(lead_id.to_string())
        .bind(black_shirt_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(found != 0)
    }

    async fn add_circle_relation(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO circle_relations (lead_id, black_shirt_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(lead_id.to_string())
        .bind(black_shirt_id.to_string())
        .bind(utc_now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(%lead_id, %black_shirt_id, "circle relation already present");
        }
        Ok(())
    }

    async fn remove_circle_relation(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM circle_relations WHERE lead_id = ? AND black_shirt_id = ?")
            .bind(lead_id.to_string())
            .bind(black_shirt_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn circle_of(&self, lead_id: Uuid) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT lead_id, black_shirt_id, created_at FROM circle_relations WHERE lead_id = ? ORDER BY created_at",
        )
        .bind(lead_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row_parsers::circle_relation_from_row(row).map(|rel| rel.black_shirt_id))
            .collect()
    }

    async fn add_membership(&self, user_id: Uuid, restaurant_id: Uuid, added_by_user_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO restaurant_memberships (user_id, restaurant_id, added_by_user_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id.to_string())
        .bind(restaurant_id.to_string())
        .bind(added_by_user_id.to_string())
        .bind(utc_now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(%user_id, %restaurant_id, "membership already present");
        }
        Ok(())
    }

    async fn remove_membership(&self, user_id: Uuid, restaurant_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM restaurant_memberships WHERE user_id = ? AND restaurant_id = ?")
            .bind(user_id.to_string())
            .bind(restaurant_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn members_of(&self, restaurant_id: Uuid) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query(
            "SELECT user_id, restaurant_id, added_by_user_id, created_at FROM restaurant_memberships WHERE restaurant_id = ? ORDER BY created_at",
        )
        .bind(restaurant_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_parsers::membership_from_row).collect()
    }
}
