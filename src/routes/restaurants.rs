use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{AccessRequest, IdentityStore, RelationshipStore};
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::Actor;
use crate::models::relation::{AddMemberRequest, Membership};
use crate::models::restaurant::{OwnerUpdateRequest, Restaurant, RestaurantCreateRequest, RestaurantUpdateRequest};
use crate::models::user::Role;
use crate::utils::utc_now;

const RESTAURANT_COLUMNS: &str = "id, name, owner_user_id, active, created_at, updated_at, deleted_at";

#[utoipa::path(
    get,
    path = "/restaurants",
    tag = "Restaurants",
    responses((status = 200, description = "Restaurants the caller can see", body = [Restaurant])),
    security(("bearerAuth" = []))
)]
pub async fn list_restaurants(State(state): State<AppState>, Actor(actor): Actor) -> AppResult<Json<Vec<Restaurant>>> {
    let rows = if actor.is_admin() {
        sqlx::query(&format!(
            "SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE deleted_at IS NULL ORDER BY name"
        ))
        .fetch_all(&state.pool)
        .await?
    } else {
        sqlx::query(&format!(
            "SELECT {cols} FROM restaurants r WHERE r.deleted_at IS NULL AND EXISTS (SELECT 1 FROM restaurant_memberships m WHERE m.restaurant_id = r.id AND m.user_id = ?) ORDER BY r.name",
            cols = "r.id, r.name, r.owner_user_id, r.active, r.created_at, r.updated_at, r.deleted_at"
        ))
        .bind(actor.id.to_string())
        .fetch_all(&state.pool)
        .await?
    };

    let restaurants = rows
        .iter()
        .map(row_parsers::restaurant_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(restaurants))
}

/// Admins create orphaned restaurants; a black shirt becomes owner and member
/// of what they create.
#[utoipa::path(
    post,
    path = "/restaurants",
    tag = "Restaurants",
    request_body = RestaurantCreateRequest,
    responses(
        (status = 201, description = "Restaurant created", body = Restaurant),
        (status = 403, description = "Not allowed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_restaurant(
    State(state): State<AppState>,
    Actor(actor): Actor,
    headers: HeaderMap,
    Json(payload): Json<RestaurantCreateRequest>,
) -> AppResult<(StatusCode, Json<Restaurant>)> {
    let owner = match actor.role {
        Role::Admin => None,
        Role::BlackShirt => Some(actor.id),
        Role::OpsLead | Role::Associate | Role::Tablet => return Err(AppError::forbidden()),
    };

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name is required"));
    }

    let now = utc_now();
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO restaurants (id, name, owner_user_id, active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(owner.map(|o| o.to_string()))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    if let Some(owner) = owner {
        state.engine.store().add_membership(owner, id, actor.id).await?;
    }

    let restaurant = fetch_restaurant(&state.pool, id).await?;
    log_activity(
        &state.event_bus,
        "created",
        Some(actor.id),
        &restaurant,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(restaurant)))
}

#[utoipa::path(
    get,
    path = "/restaurants/{id}",
    tag = "Restaurants",
    params(("id" = Uuid, Path, description = "Restaurant id")),
    responses(
        (status = 200, description = "Restaurant detail", body = Restaurant),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Restaurant not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_restaurant(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Restaurant>> {
    let restaurant = fetch_restaurant(&state.pool, id).await?;
    state.engine.check(&actor, AccessRequest::ViewRestaurant(restaurant.id)).await?;
    Ok(Json(restaurant))
}

#[utoipa::path(
    put,
    path = "/restaurants/{id}",
    tag = "Restaurants",
    params(("id" = Uuid, Path, description = "Restaurant id")),
    request_body = RestaurantUpdateRequest,
    responses(
        (status = 200, description = "Restaurant updated", body = Restaurant),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Restaurant not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_restaurant(
    State(state): State<AppState>,
    Actor(actor): Actor,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RestaurantUpdateRequest>,
) -> AppResult<Json<Restaurant>> {
    let old = fetch_restaurant(&state.pool, id).await?;
    state.engine.check(&actor, AccessRequest::ManageRestaurant(&old)).await?;

    let mut restaurant = old.clone();
    if let Some(name) = payload.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(AppError::bad_request("name cannot be empty"));
        }
        restaurant.name = name.to_string();
    }
    if let Some(active) = payload.active {
        restaurant.active = active;
    }
    restaurant.updated_at = utc_now();

    sqlx::query("UPDATE restaurants SET name = ?, active = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(&restaurant.name)
        .bind(restaurant.active)
        .bind(restaurant.updated_at)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(actor.id),
        &restaurant,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(restaurant))
}

#[utoipa::path(
    delete,
    path = "/restaurants/{id}",
    tag = "Restaurants",
    params(("id" = Uuid, Path, description = "Restaurant id")),
    responses(
        (status = 204, description = "Restaurant soft deleted"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Restaurant not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_restaurant(
    State(state): State<AppState>,
    Actor(actor): Actor,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let restaurant = fetch_restaurant(&state.pool, id).await?;
    state.engine.check(&actor, AccessRequest::ManageRestaurant(&restaurant)).await?;

    let now = utc_now();
    let affected = sqlx::query("UPDATE restaurants SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("restaurant not found"));
    }

    log_activity(
        &state.event_bus,
        "deleted",
        Some(actor.id),
        &restaurant,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Reassign or clear ownership. `null` orphans the restaurant, leaving it open
/// to any ops lead.
#[utoipa::path(
    put,
    path = "/restaurants/{id}/owner",
    tag = "Restaurants",
    params(("id" = Uuid, Path, description = "Restaurant id")),
    request_body = OwnerUpdateRequest,
    responses(
        (status = 200, description = "Ownership changed", body = Restaurant),
        (status = 400, description = "New owner is not a black shirt"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Restaurant or user not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_owner(
    State(state): State<AppState>,
    Actor(actor): Actor,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<OwnerUpdateRequest>,
) -> AppResult<Json<Restaurant>> {
    let old = fetch_restaurant(&state.pool, id).await?;
    state.engine.check(&actor, AccessRequest::ManageRestaurant(&old)).await?;

    if let Some(owner_id) = payload.owner_user_id {
        let owner = state.engine.store().get_user(owner_id).await?;
        if owner.role != Role::BlackShirt {
            return Err(AppError::bad_request("restaurant owner must be a black shirt"));
        }
    }

    let now = utc_now();
    sqlx::query("UPDATE restaurants SET owner_user_id = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(payload.owner_user_id.map(|o| o.to_string()))
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    if let Some(owner_id) = payload.owner_user_id {
        state.engine.store().add_membership(owner_id, id, actor.id).await?;
    }

    let restaurant = Restaurant {
        owner_user_id: payload.owner_user_id,
        updated_at: now,
        ..old.clone()
    };

    log_activity(
        &state.event_bus,
        "owner_changed",
        Some(actor.id),
        &restaurant,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(restaurant))
}

#[utoipa::path(
    get,
    path = "/restaurants/{id}/members",
    tag = "Restaurants",
    params(("id" = Uuid, Path, description = "Restaurant id")),
    responses(
        (status = 200, description = "Direct members", body = [Membership]),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Restaurant not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Membership>>> {
    let restaurant = fetch_restaurant(&state.pool, id).await?;
    state.engine.check(&actor, AccessRequest::ViewRestaurant(restaurant.id)).await?;

    Ok(Json(state.engine.store().members_of(restaurant.id).await?))
}

/// Grant a user direct access. Re-adding an existing member is a no-op.
#[utoipa::path(
    post,
    path = "/restaurants/{id}/members",
    tag = "Restaurants",
    params(("id" = Uuid, Path, description = "Restaurant id")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = Membership),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Restaurant or user not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<Membership>)> {
    let restaurant = fetch_restaurant(&state.pool, id).await?;
    let target = state.engine.store().get_user(payload.user_id).await?;

    let request = AccessRequest::ManageUsers {
        restaurant: &restaurant,
        target_role: target.role,
    };
    state.engine.check(&actor, request).await?;

    let store = state.engine.store();
    store.add_membership(target.id, restaurant.id, actor.id).await?;

    let membership = store
        .members_of(restaurant.id)
        .await?
        .into_iter()
        .find(|m| m.user_id == target.id)
        .ok_or_else(|| AppError::internal("membership missing after insert"))?;

    log_activity(
        &state.event_bus,
        "granted",
        Some(actor.id),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(membership)))
}

#[utoipa::path(
    delete,
    path = "/restaurants/{id}/members/{user_id}",
    tag = "Restaurants",
    params(
        ("id" = Uuid, Path, description = "Restaurant id"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Restaurant, user or membership not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let restaurant = fetch_restaurant(&state.pool, id).await?;
    let target = state.engine.store().get_user(user_id).await?;

    let request = AccessRequest::ManageUsers {
        restaurant: &restaurant,
        target_role: target.role,
    };
    state.engine.check(&actor, request).await?;

    let removed = state.engine.store().remove_membership(target.id, restaurant.id).await?;
    if !removed {
        return Err(AppError::not_found("membership not found"));
    }

    let membership = Membership {
        user_id: target.id,
        restaurant_id: restaurant.id,
        added_by_user_id: None,
        created_at: utc_now(),
    };
    log_activity(
        &state.event_bus,
        "revoked",
        Some(actor.id),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a live restaurant. Deleted restaurants are not found.
async fn fetch_restaurant(pool: &SqlitePool, id: Uuid) -> AppResult<Restaurant> {
    let row = sqlx::query(&format!(
        "SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("restaurant not found"))?;

    row_parsers::restaurant_from_row(&row)
}
