use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class for activity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Access-control changes; never trimmed.
    Critical,
    #[default]
    Important,
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Entities that can be published on the activity bus.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of the event name, e.g. "restaurant" in "restaurant.created".
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "granted" | "revoked" => Severity::Critical,
            "created" | "updated" => self.severity(),
            _ => Severity::Important,
        }
    }
}
