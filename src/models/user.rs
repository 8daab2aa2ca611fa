use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

/// The fixed role hierarchy: admin > ops_lead > black_shirt > associate / tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    OpsLead,
    BlackShirt,
    Associate,
    Tablet,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::OpsLead,
        Role::BlackShirt,
        Role::Associate,
        Role::Tablet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::OpsLead => "ops_lead",
            Role::BlackShirt => "black_shirt",
            Role::Associate => "associate",
            Role::Tablet => "tablet",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == value)
            .ok_or_else(|| AppError::invalid_role(value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub job_title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl Loggable for User {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> Uuid { self.id }

    // role changes move authority around
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "role_changed" | "deleted" => Severity::Critical,
            "registered" => Severity::Important,
            _ => Severity::Noise,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub job_title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<DbUser> for User {
    fn from(value: DbUser) -> Self {
        User {
            id: value.id,
            name: value.name,
            email: value.email,
            role: value.role,
            job_title: value.job_title,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted_at: value.deleted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Rosa Diaz")]
    pub name: String,
    #[schema(example = "rosa@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    #[schema(example = "Shift Lead")]
    pub job_title: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "rosa@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Role arrives as free text so an unknown value maps to a 400 rather than a
/// body-deserialization rejection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    #[schema(example = "ops_lead")]
    pub role: String,
}
