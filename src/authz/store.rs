use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::relation::Membership;
use crate::models::user::User;

/// User lookup. A missing or deleted user is `AppError::NotFound`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> AppResult<User>;
}

/// Membership and circle relations.
///
/// Both relations are sets: inserts are idempotent and a duplicate insert,
/// concurrent or not, is a silent no-op.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// True if a membership row exists for the pair, or the user is an admin.
    async fn has_membership(&self, user_id: Uuid, restaurant_id: Uuid) -> AppResult<bool>;

    async fn is_in_circle(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<bool>;

    async fn add_circle_relation(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<()>;

    /// Returns whether an edge was actually removed.
    async fn remove_circle_relation(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<bool>;

    /// Black shirts overseen by `lead_id`.
    async fn circle_of(&self, lead_id: Uuid) -> AppResult<Vec<Uuid>>;

    async fn add_membership(&self, user_id: Uuid, restaurant_id: Uuid, added_by_user_id: Uuid) -> AppResult<()>;

    async fn remove_membership(&self, user_id: Uuid, restaurant_id: Uuid) -> AppResult<bool>;

    async fn members_of(&self, restaurant_id: Uuid) -> AppResult<Vec<Membership>>;
}

/// Everything the authorization engine reads from.
pub trait AccessStore: IdentityStore + RelationshipStore {}

impl<T: IdentityStore + RelationshipStore> AccessStore for T {}
