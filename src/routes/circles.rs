//! Admin-managed circles: which black shirts each ops lead oversees.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{IdentityStore, RelationshipStore};
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::Actor;
use crate::models::relation::{AddCircleRequest, CircleRelation};
use crate::models::user::Role;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/circles/{lead_id}",
    tag = "Circles",
    params(("lead_id" = Uuid, Path, description = "Ops lead id")),
    responses(
        (status = 200, description = "Black shirts in the lead's circle", body = [CircleRelation]),
        (status = 403, description = "Not an admin")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_circle(
    State(state): State<AppState>,
    actor: Actor,
    Path(lead_id): Path<Uuid>,
) -> AppResult<Json<Vec<CircleRelation>>> {
    actor.require_admin()?;

    let rows = sqlx::query(
        "SELECT lead_id, black_shirt_id, created_at FROM circle_relations WHERE lead_id = ? ORDER BY created_at",
    )
    .bind(lead_id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let relations = rows
        .iter()
        .map(row_parsers::circle_relation_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(relations))
}

/// Put a black shirt under an ops lead. Adding an existing edge is a no-op.
#[utoipa::path(
    post,
    path = "/circles",
    tag = "Circles",
    request_body = AddCircleRequest,
    responses(
        (status = 201, description = "Circle relation recorded", body = CircleRelation),
        (status = 400, description = "Lead is not an ops lead or member is not a black shirt"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_to_circle(
    State(state): State<AppState>,
    actor: Actor,
    headers: HeaderMap,
    Json(payload): Json<AddCircleRequest>,
) -> AppResult<(StatusCode, Json<CircleRelation>)> {
    let admin = actor.require_admin()?;
    let store = state.engine.store();

    let lead = store.get_user(payload.lead_id).await?;
    if lead.role != Role::OpsLead {
        return Err(AppError::bad_request("circle lead must be an ops lead"));
    }
    let member = store.get_user(payload.black_shirt_id).await?;
    if member.role != Role::BlackShirt {
        return Err(AppError::bad_request("circle member must be a black shirt"));
    }

    store.add_circle_relation(lead.id, member.id).await?;

    let row = sqlx::query(
        "SELECT lead_id, black_shirt_id, created_at FROM circle_relations WHERE lead_id = ? AND black_shirt_id = ?",
    )
    .bind(lead.id.to_string())
    .bind(member.id.to_string())
    .fetch_one(&state.pool)
    .await?;
    let relation = row_parsers::circle_relation_from_row(&row)?;

    log_activity(
        &state.event_bus,
        "granted",
        Some(admin.id),
        &relation,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(relation)))
}

#[utoipa::path(
    delete,
    path = "/circles/{lead_id}/{black_shirt_id}",
    tag = "Circles",
    params(
        ("lead_id" = Uuid, Path, description = "Ops lead id"),
        ("black_shirt_id" = Uuid, Path, description = "Black shirt id")
    ),
    responses(
        (status = 204, description = "Circle relation removed"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "No such relation")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_from_circle(
    State(state): State<AppState>,
    actor: Actor,
    headers: HeaderMap,
    Path((lead_id, black_shirt_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let admin = actor.require_admin()?;

    let removed = state.engine.store().remove_circle_relation(lead_id, black_shirt_id).await?;
    if !removed {
        return Err(AppError::not_found("circle relation not found"));
    }

    let relation = CircleRelation {
        lead_id,
        black_shirt_id,
        created_at: utc_now(),
    };
    log_activity(
        &state.event_bus,
        "revoked",
        Some(admin.id),
        &relation,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
