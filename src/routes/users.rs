//! Admin-only user administration.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::IdentityStore;
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::Actor;
use crate::models::user::{Role, RoleUpdateRequest, User};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "All active users", body = [User]),
        (status = 403, description = "Not an admin")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<User>>> {
    actor.require_admin()?;

    let rows = sqlx::query(
        "SELECT id, name, email, password_hash, role, job_title, created_at, updated_at, deleted_at FROM users WHERE deleted_at IS NULL ORDER BY created_at",
    )
    .fetch_all(&state.pool)
    .await?;

    let users = rows
        .iter()
        .map(|row| row_parsers::db_user_from_row(row).map(User::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    put,
    path = "/users/{id}/role",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role changed", body = User),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    actor: Actor,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<User>> {
    let admin = actor.require_admin()?;
    let role: Role = payload
        .role
        .parse()
        .map_err(|_| AppError::bad_request(format!("unknown role: {}", payload.role)))?;

    if admin.id == id && role != Role::Admin {
        return Err(AppError::bad_request("admins cannot demote themselves"));
    }

    let old = state.engine.store().get_user(id).await?;

    let now = utc_now();
    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(role.as_str())
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    let user = User {
        role,
        updated_at: now,
        ..old.clone()
    };

    tracing::info!(user_id = %id, from = %old.role, to = %role, "role changed");
    log_activity(
        &state.event_bus,
        "role_changed",
        Some(admin.id),
        &user,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(user))
}
