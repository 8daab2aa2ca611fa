//! Authorization: who may view or manage which restaurants and their staff.
//!
//! - `store`: the identity and relationship lookups the engine consumes
//! - `sqlite` / `memory`: store implementations
//! - `engine`: the decision procedure (admin bypass, ownership, circles, memberships)

mod engine;
mod memory;
mod sqlite;
mod store;

pub use engine::{AccessRequest, AuthorizationEngine, Verdict};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{AccessStore, IdentityStore, RelationshipStore};

use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_TIMEOUT_MS: u64 = 2_000;

/// Engine settings read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthzConfig {
    /// Deadline for one authorization check, store lookups included.
    pub timeout: Duration,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl AuthzConfig {
    pub fn from_env() -> Result<Self, AppError> {
        match std::env::var("AUTHZ_TIMEOUT_MS") {
            Ok(raw) => Self::parse_timeout(&raw),
            Err(_) => Ok(Self::default()),
        }
    }

    fn parse_timeout(raw: &str) -> Result<Self, AppError> {
        let ms = raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| AppError::configuration("AUTHZ_TIMEOUT_MS must be a positive integer"))?;
        Ok(Self {
            timeout: Duration::from_millis(ms),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timeout_in_millis() {
        let cfg = AuthzConfig::parse_timeout(" 250 ").unwrap();
        assert_eq!(cfg.timeout, Duration::from_millis(250));
    }

    #[test]
    fn rejects_zero_and_garbage_timeouts() {
        assert!(AuthzConfig::parse_timeout("0").is_err());
        assert!(AuthzConfig::parse_timeout("soon").is_err());
    }
}
