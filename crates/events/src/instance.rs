//! Event instance identity.
//!
//! Every physical receipt of an event is keyed so the registry can tell a
//! retransmit of the same instance from a genuinely new one. The key comes from
//! the payload when possible:
//!
//! 1. an explicit id field (`eventId`, `event_id`, `id` by default)
//! 2. a timestamp field (`timestamp`, `ts`, `createdAt` by default)
//! 3. the wall-clock time of receipt, in milliseconds
//!
//! The fallbacks are an approximation: two distinct id-less events carrying the
//! same timestamp (or received in the same millisecond) share a key and are
//! treated as one instance per registration. Producers that need exactness must
//! send an explicit id.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Identity of one event instance, used for per-registration deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum EventInstanceId {
    /// Taken from an explicit id field on the payload.
    Explicit(String),
    /// Taken from a timestamp field on the payload.
    Timestamp(String),
    /// Receipt time (unix milliseconds); neither field was present.
    Received(i64),
}

impl core::fmt::Display for EventInstanceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EventInstanceId::Explicit(id) => write!(f, "id:{id}"),
            EventInstanceId::Timestamp(ts) => write!(f, "ts:{ts}"),
            EventInstanceId::Received(ms) => write!(f, "recv:{ms}"),
        }
    }
}

/// Which payload fields identify an instance, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceKeyConfig {
    pub id_fields: Vec<String>,
    pub timestamp_fields: Vec<String>,
}

impl Default for InstanceKeyConfig {
    fn default() -> Self {
        Self {
            id_fields: vec!["eventId".into(), "event_id".into(), "id".into()],
            timestamp_fields: vec!["timestamp".into(), "ts".into(), "createdAt".into()],
        }
    }
}

/// Source of receipt time.
pub trait Clock {
    /// Current unix time in milliseconds.
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

impl InstanceKeyConfig {
    /// Derive the instance id for `payload`.
    pub fn instance_id(&self, payload: &JsonValue, clock: &dyn Clock) -> EventInstanceId {
        if let Some(id) = first_scalar(payload, &self.id_fields) {
            return EventInstanceId::Explicit(id);
        }
        if let Some(ts) = first_scalar(payload, &self.timestamp_fields) {
            return EventInstanceId::Timestamp(ts);
        }
        EventInstanceId::Received(clock.now_millis())
    }
}

fn first_scalar(payload: &JsonValue, fields: &[String]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| payload.get(field.as_str()).and_then(scalar_key))
}

// Objects, arrays, nulls and empty strings do not identify anything.
fn scalar_key(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    fn key(payload: JsonValue) -> EventInstanceId {
        InstanceKeyConfig::default().instance_id(&payload, &FixedClock(42))
    }

    #[test]
    fn explicit_id_wins_over_timestamp() {
        let id = key(json!({"eventId": "e1", "timestamp": "2026-01-01T00:00:00Z"}));
        assert_eq!(id, EventInstanceId::Explicit("e1".into()));
    }

    #[test]
    fn id_fields_checked_in_order() {
        let id = key(json!({"id": "later", "event_id": "first"}));
        assert_eq!(id, EventInstanceId::Explicit("first".into()));
    }

    #[test]
    fn numeric_ids_are_accepted() {
        assert_eq!(key(json!({"id": 17})), EventInstanceId::Explicit("17".into()));
    }

    #[test]
    fn timestamp_used_when_no_id() {
        let id = key(json!({"orderId": "o1", "ts": 1_700_000_000_123_i64}));
        assert_eq!(id, EventInstanceId::Timestamp("1700000000123".into()));
    }

    #[test]
    fn receipt_time_is_the_last_resort() {
        assert_eq!(key(json!({"orderId": "o1"})), EventInstanceId::Received(42));
        assert_eq!(key(json!("just a string")), EventInstanceId::Received(42));
        assert_eq!(key(JsonValue::Null), EventInstanceId::Received(42));
    }

    #[test]
    fn non_scalar_and_empty_values_are_skipped() {
        let id = key(json!({"eventId": "", "id": {"nested": true}, "timestamp": null, "createdAt": "t1"}));
        assert_eq!(id, EventInstanceId::Timestamp("t1".into()));
    }

    #[test]
    fn sources_never_collide() {
        assert_ne!(
            EventInstanceId::Explicit("5".into()),
            EventInstanceId::Timestamp("5".into())
        );
    }

    #[test]
    fn custom_fields() {
        let keys = InstanceKeyConfig {
            id_fields: vec!["messageId".into()],
            timestamp_fields: vec![],
        };
        let clock = FixedClock(7);
        assert_eq!(
            keys.instance_id(&json!({"messageId": "m9", "eventId": "ignored"}), &clock),
            EventInstanceId::Explicit("m9".into())
        );
        assert_eq!(
            keys.instance_id(&json!({"timestamp": "ignored"}), &clock),
            EventInstanceId::Received(7)
        );
    }
}
