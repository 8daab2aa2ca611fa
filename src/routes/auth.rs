use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::Actor;
use crate::models::user::{AuthResponse, LoginRequest, RegisterRequest, Role, User};
use crate::utils::{hash_password, normalize_email, utc_now, verify_password};

/// Sign up. The very first account becomes the admin; everyone after starts as
/// an associate until an admin changes their role.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Missing fields or password too short"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email);
    if payload.name.trim().is_empty() || email.is_empty() {
        return Err(AppError::bad_request("name and email are required"));
    }
    ensure_email_available(&state.pool, &email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = uuid::Uuid::new_v4();

    let mut tx = state.pool.begin().await?;
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    let role = if existing == 0 { Role::Admin } else { Role::Associate };

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, job_title, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(payload.name.trim())
    .bind(&email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(&payload.job_title)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    if role == Role::Admin {
        tracing::info!(%user_id, "bootstrap admin registered");
    }

    let user: User = fetch_user_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::internal("registered user vanished"))?
        .into();
    let token = state.jwt.encode(user.id)?;

    log_activity(
        &state.event_bus,
        "registered",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = fetch_user_by_email(&state.pool, &normalize_email(&payload.email))
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_user.id)?;
    Ok(Json(AuthResponse { token, user: db_user.into() }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(Actor(user): Actor) -> AppResult<Json<User>> {
    Ok(Json(user))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<crate::models::user::DbUser>> {
    let row = sqlx::query(
        "SELECT id, name, email, password_hash, role, job_title, created_at, updated_at, deleted_at FROM users WHERE email = ? AND deleted_at IS NULL",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_parsers::db_user_from_row).transpose()
}
