//! Activity event bus.
//!
//! Handlers publish access-control changes as JSON domain events on a
//! broadcast channel. A single listener projects them into `activity_log` and
//! appends them to the hash-chained `event_store`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

const BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: impl Into<String>, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(BUS_CAPACITY)
}

/// Request metadata attached to activity records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

/// Publish `<entity>.<action>` for `entity`. Never fails the caller.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let name = format!("{}.{}", T::entity_type(), action);

    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity: entity.severity_for_action(action),
    };

    let event = DomainEvent::new(
        name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    // no receiver is fine
    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

fn describe(name: &str) -> &'static str {
    match name {
        "user.registered" => "New user registered",
        "user.role_changed" => "User role changed",
        "restaurant.created" => "Restaurant created",
        "restaurant.updated" => "Restaurant updated",
        "restaurant.deleted" => "Restaurant deleted",
        "restaurant.owner_changed" => "Restaurant ownership changed",
        "membership.granted" => "Restaurant access granted",
        "membership.revoked" => "Restaurant access revoked",
        "circle.granted" => "Black shirt added to circle",
        "circle.revoked" => "Black shirt removed from circle",
        _ => "System event",
    }
}

/// SHA-256 over the previous chain hash followed by the payload.
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Err(e) = persist_event(&pool, &event).await {
            tracing::error!(error = %e, "failed to persist activity event");
        }
    }
    tracing::info!("activity listener stopped");
}

async fn persist_event(pool: &SqlitePool, event: &Value) -> Result<(), sqlx::Error> {
    let name = event.get("name").and_then(Value::as_str).unwrap_or("unknown");
    let actor_id = event
        .get("actor_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok());
    let subject_id = event
        .get("subject_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok());
    let occurred_at = event
        .get("occurred_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let severity = event
        .get("payload")
        .and_then(|p| p.get("severity"))
        .and_then(Value::as_str)
        .unwrap_or(Severity::Important.as_str());
    let payload = serde_json::to_string(event).unwrap_or_default();

    let actor_id = actor_id.map(|u| u.to_string());
    let subject_id = subject_id.map(|u| u.to_string());

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(describe(name))
    .bind(&actor_id)
    .bind(&subject_id)
    .bind(occurred_at)
    .bind(&payload)
    .bind(severity)
    .execute(pool)
    .await?;

    // read and append in one transaction so the chain never forks
    let mut tx = pool.begin().await?;

    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM event_store ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
    let hash = chain_hash(prev_hash.as_deref(), &payload);

    sqlx::query(
        r#"
        INSERT INTO event_store (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(occurred_at)
    .bind(&actor_id)
    .bind(&subject_id)
    .bind(&payload)
    .bind(severity)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Probe {
        id: Uuid,
    }

    impl Loggable for Probe {
        fn entity_type() -> &'static str { "probe" }
        fn subject_id(&self) -> Uuid { self.id }
    }

    #[tokio::test]
    async fn log_activity_publishes_named_event() {
        let (bus, mut rx) = init_event_bus();
        let probe = Probe { id: Uuid::new_v4() };
        let actor = Uuid::new_v4();

        log_activity(&bus, "revoked", Some(actor), &probe, None, None);

        let event = rx.recv().await.unwrap();
        assert_eq!(event["name"], "probe.revoked");
        assert_eq!(event["actor_id"], actor.to_string());
        assert_eq!(event["subject_id"], probe.id.to_string());
        assert_eq!(event["payload"]["severity"], "critical");
    }

    #[test]
    fn log_activity_without_listener_does_not_panic() {
        let (bus, rx) = init_event_bus();
        drop(rx);
        log_activity(&bus, "created", None, &Probe { id: Uuid::new_v4() }, None, None);
    }

    #[test]
    fn chain_hash_depends_on_previous_hash() {
        let first = chain_hash(None, "payload");
        let second = chain_hash(Some(&first), "payload");
        assert_ne!(first, second);
        assert_eq!(first.len(), 64);
        assert_eq!(chain_hash(Some(&first), "payload"), second);
    }
}
