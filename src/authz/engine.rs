use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::restaurant::{Ownership, Restaurant};
use crate::models::user::{Role, User};

use super::store::AccessStore;

/// What the actor is trying to do.
#[derive(Debug, Clone, Copy)]
pub enum AccessRequest<'a> {
    /// Update, delete or change settings of a restaurant.
    ManageRestaurant(&'a Restaurant),
    /// Invite or assign a user holding `target_role` into a restaurant.
    ManageUsers {
        restaurant: &'a Restaurant,
        target_role: Role,
    },
    /// Day-to-day visibility (orders, kitchen, reporting).
    ViewRestaurant(Uuid),
}

impl AccessRequest<'_> {
    pub fn restaurant_id(&self) -> Uuid {
        match self {
            AccessRequest::ManageRestaurant(r) => r.id,
            AccessRequest::ManageUsers { restaurant, .. } => restaurant.id,
            AccessRequest::ViewRestaurant(id) => *id,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            AccessRequest::ManageRestaurant(_) => "manage_restaurant",
            AccessRequest::ManageUsers { .. } => "manage_users",
            AccessRequest::ViewRestaurant(_) => "view_restaurant",
        }
    }
}

/// Allow/deny plus an internal reason label. The reason is for logs only and
/// never reaches a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: &'static str,
}

impl Verdict {
    pub fn allow(reason: &'static str) -> Self {
        Self { allowed: true, reason }
    }

    pub fn deny(reason: &'static str) -> Self {
        Self { allowed: false, reason }
    }

    fn from_bool(allowed: bool, allow_reason: &'static str, deny_reason: &'static str) -> Self {
        if allowed {
            Self::allow(allow_reason)
        } else {
            Self::deny(deny_reason)
        }
    }

    /// Collapse into the host's error type: a denial becomes a generic 403.
    pub fn into_result(self) -> AppResult<()> {
        if self.allowed {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }
}

/// Relationship-based authorization over users, restaurants, memberships and
/// circles.
///
/// Every predicate is a point-in-time read of the store. Business states such
/// as an orphaned restaurant or a missing circle edge produce a verdict, never
/// an error; only store failures propagate.
pub struct AuthorizationEngine<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S> Clone for AuthorizationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timeout: self.timeout,
        }
    }
}

impl<S: AccessStore> AuthorizationEngine<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn can_manage_restaurant(&self, actor: &User, restaurant: &Restaurant) -> AppResult<bool> {
        Ok(self.evaluate(actor, AccessRequest::ManageRestaurant(restaurant)).await?.allowed)
    }

    pub async fn can_manage_users_in_restaurant(
        &self,
        actor: &User,
        restaurant: &Restaurant,
        target_role: Role,
    ) -> AppResult<bool> {
        let request = AccessRequest::ManageUsers { restaurant, target_role };
        Ok(self.evaluate(actor, request).await?.allowed)
    }

    pub async fn has_restaurant_access(&self, actor: &User, restaurant_id: Uuid) -> AppResult<bool> {
        Ok(self.evaluate(actor, AccessRequest::ViewRestaurant(restaurant_id)).await?.allowed)
    }

    /// Evaluate a request. Admins short-circuit here, before any store read.
    pub async fn evaluate(&self, actor: &User, request: AccessRequest<'_>) -> AppResult<Verdict> {
        let verdict = if actor.is_admin() {
            Verdict::allow("admin")
        } else {
            match request {
                AccessRequest::ManageRestaurant(restaurant) => self.manage_restaurant(actor, restaurant).await?,
                AccessRequest::ManageUsers { restaurant, target_role } => {
                    self.manage_users(actor, restaurant, target_role).await?
                }
                AccessRequest::ViewRestaurant(restaurant_id) => self.view_restaurant(actor, restaurant_id).await?,
            }
        };

        tracing::debug!(
            user_id = %actor.id,
            role = %actor.role,
            restaurant_id = %request.restaurant_id(),
            action = request.action(),
            allowed = verdict.allowed,
            reason = verdict.reason,
            "authorization verdict"
        );
        Ok(verdict)
    }

    /// Host entry point: evaluate under the configured deadline and turn a
    /// denial into `Forbidden`. An expired deadline fails closed.
    pub async fn check(&self, actor: &User, request: AccessRequest<'_>) -> AppResult<()> {
        match tokio::time::timeout(self.timeout, self.evaluate(actor, request)).await {
            Ok(verdict) => verdict?.into_result(),
            Err(_) => {
                tracing::warn!(
                    user_id = %actor.id,
                    restaurant_id = %request.restaurant_id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "authorization check timed out"
                );
                Err(AppError::internal("authorization check timed out"))
            }
        }
    }

    /// Like [`check`](Self::check) but resolves the actor first. A missing actor
    /// is `NotFound`.
    pub async fn authorize(&self, actor_id: Uuid, request: AccessRequest<'_>) -> AppResult<User> {
        let actor = self.store.get_user(actor_id).await?;
        self.check(&actor, request).await?;
        Ok(actor)
    }

    async fn manage_restaurant(&self, actor: &User, restaurant: &Restaurant) -> AppResult<Verdict> {
        let verdict = match actor.role {
            Role::Admin => Verdict::allow("admin"),
            Role::BlackShirt => Verdict::from_bool(restaurant.is_owned_by(actor.id), "owner", "not_owner"),
            Role::OpsLead => self.lead_governs(actor, restaurant).await?,
            Role::Associate | Role::Tablet => Verdict::deny("role_cannot_manage"),
        };
        Ok(verdict)
    }

    async fn manage_users(&self, actor: &User, restaurant: &Restaurant, target_role: Role) -> AppResult<Verdict> {
        let verdict = match actor.role {
            Role::Admin => Verdict::allow("admin"),
            // both conditions must hold; ownership alone is not enough
            Role::BlackShirt if !restaurant.is_owned_by(actor.id) => Verdict::deny("not_owner"),
            Role::BlackShirt => {
                Verdict::from_bool(target_role == Role::Associate, "owner_staffing_associate", "target_role_too_high")
            }
            Role::OpsLead => self.lead_governs(actor, restaurant).await?,
            Role::Associate | Role::Tablet => Verdict::deny("role_cannot_manage"),
        };
        Ok(verdict)
    }

    async fn view_restaurant(&self, actor: &User, restaurant_id: Uuid) -> AppResult<Verdict> {
        // circles grant management, not visibility
        let member = self.store.has_membership(actor.id, restaurant_id).await?;
        Ok(Verdict::from_bool(member, "member", "not_member"))
    }

    /// An ops lead governs orphaned restaurants and those owned by a black
    /// shirt in their circle.
    async fn lead_governs(&self, lead: &User, restaurant: &Restaurant) -> AppResult<Verdict> {
        match restaurant.ownership() {
            Ownership::Orphaned => Ok(Verdict::allow("orphaned")),
            Ownership::Owned(owner) => {
                let in_circle = self.store.is_in_circle(lead.id, owner).await?;
                Ok(Verdict::from_bool(in_circle, "circle", "outside_circle"))
            }
        }
    }
}
