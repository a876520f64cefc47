//! Wire frames carried by the realtime socket.
//!
//! The backend pushes JSON text of the form:
//!
//! ```text
//! {"event": "order:created", "data": {"eventId": "e1", "orderId": "o1"}}
//! ```
//!
//! `data` may be omitted (it becomes `null`).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use servewise_core::{CoreError, EventName};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame has no string `event` field")]
    MissingEvent,
    #[error(transparent)]
    InvalidEvent(#[from] CoreError),
}

/// One server push: an event name plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: EventName,
    #[serde(default)]
    pub data: JsonValue,
}

impl WireFrame {
    pub fn new(event: EventName, data: JsonValue) -> Self {
        Self { event, data }
    }

    /// Decode one frame from its JSON text.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let raw: JsonValue = serde_json::from_str(text)?;
        let event = raw
            .get("event")
            .and_then(JsonValue::as_str)
            .ok_or(FrameError::MissingEvent)?;
        let event = EventName::new(event)?;
        let data = raw.get("data").cloned().unwrap_or(JsonValue::Null);
        Ok(Self { event, data })
    }

    pub fn encode(&self) -> String {
        serde_json::json!({ "event": self.event.as_str(), "data": self.data }).to_string()
    }
}
