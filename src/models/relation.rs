use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

// =============================================================================
// MEMBERSHIP (user <-> restaurant)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Membership {
    pub user_id: Uuid,
    pub restaurant_id: Uuid,
    pub added_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Loggable for Membership {
    fn entity_type() -> &'static str { "membership" }
    fn subject_id(&self) -> Uuid { self.restaurant_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

// =============================================================================
// CIRCLE (ops_lead <-> black_shirt)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CircleRelation {
    pub lead_id: Uuid,
    pub black_shirt_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for CircleRelation {
    fn entity_type() -> &'static str { "circle" }
    fn subject_id(&self) -> Uuid { self.lead_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCircleRequest {
    pub lead_id: Uuid,
    pub black_shirt_id: Uuid,
}
