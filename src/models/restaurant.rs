use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Restaurant {
    pub id: Uuid,
    pub name: String,
    /// Owning black_shirt. `None` means the restaurant is orphaned.
    pub owner_user_id: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Who currently governs a restaurant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned(Uuid),
    Orphaned,
}

impl Restaurant {
    pub fn ownership(&self) -> Ownership {
        match self.owner_user_id {
            Some(owner) => Ownership::Owned(owner),
            None => Ownership::Orphaned,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.ownership() == Ownership::Owned(user_id)
    }
}

impl Loggable for Restaurant {
    fn entity_type() -> &'static str { "restaurant" }
    fn subject_id(&self) -> Uuid { self.id }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "owner_changed" => Severity::Critical,
            _ => self.severity(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RestaurantCreateRequest {
    #[schema(example = "Downtown Kitchen")]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RestaurantUpdateRequest {
    #[schema(example = "Downtown Kitchen & Bar")]
    pub name: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OwnerUpdateRequest {
    /// New owning black_shirt, or null to orphan the restaurant.
    pub owner_user_id: Option<Uuid>,
}
