use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::relation::Membership;
use crate::models::user::User;
use crate::utils::utc_now;

use super::store::{IdentityStore, RelationshipStore};

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    circles: HashSet<(Uuid, Uuid)>,
    // keyed by (restaurant, user) so members_of is a range scan
    memberships: BTreeMap<(Uuid, Uuid), Membership>,
}

/// Process-local store. Used by tests and for embedding the engine without a
/// database. Every mutation takes the write lock, so insert-if-absent is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.state
            .read()
            .await
            .users
            .get(&id)
            .filter(|user| user.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| AppError::not_found("user not found"))
    }
}

#[async_trait]
impl RelationshipStore for MemoryStore {
    async fn has_membership(&self, user_id: Uuid, restaurant_id: Uuid) -> AppResult<bool> {
        let state = self.state.read().await;
        let is_admin = state
            .users
            .get(&user_id)
            .is_some_and(|user| user.is_admin() && user.deleted_at.is_none());
        Ok(is_admin || state.memberships.contains_key(&(restaurant_id, user_id)))
    }

    async fn is_in_circle(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<bool> {
        Ok(self.state.read().await.circles.contains(&(lead_id, black_shirt_id)))
    }

    async fn add_circle_relation(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<()> {
        self.state.write().await.circles.insert((lead_id, black_shirt_id));
        Ok(())
    }

    async fn remove_circle_relation(&self, lead_id: Uuid, black_shirt_id: Uuid) -> AppResult<bool> {
        Ok(self.state.write().await.circles.remove(&(lead_id, black_shirt_id)))
    }

    async fn circle_of(&self, lead_id: Uuid) -> AppResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .circles
            .iter()
            .filter(|(lead, _)| *lead == lead_id)
            .map(|(_, black_shirt)| *black_shirt)
            .collect())
    }

    async fn add_membership(&self, user_id: Uuid, restaurant_id: Uuid, added_by_user_id: Uuid) -> AppResult<()> {
        self.state
            .write()
            .await
            .memberships
            .entry((restaurant_id, user_id))
            .or_insert_with(|| Membership {
                user_id,
                restaurant_id,
                added_by_user_id: Some(added_by_user_id),
                created_at: utc_now(),
            });
        Ok(())
    }

    async fn remove_membership(&self, user_id: Uuid, restaurant_id: Uuid) -> AppResult<bool> {
        Ok(self
            .state
            .write()
            .await
            .memberships
            .remove(&(restaurant_id, user_id))
            .is_some())
    }

    async fn members_of(&self, restaurant_id: Uuid) -> AppResult<Vec<Membership>> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .range((restaurant_id, Uuid::nil())..=(restaurant_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, membership)| membership.clone())
            .collect())
    }
}
