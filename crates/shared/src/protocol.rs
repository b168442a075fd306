use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Transitions the store reducer understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreAction {
    ChangeInput { key: String, value: Value },
    RemoveField { key: String },
    LogEvent { name: String, data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub id: Uuid,
    pub name: String,
    pub data: Value,
    pub recorded_at: DateTime<Utc>,
}

impl LoggedEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            data,
            recorded_at: Utc::now(),
        }
    }
}

/// JSON frame pushed by the backend over the WebSocket.
///
/// Frames that name an `action` are re-dispatched into the runtime; all
/// frames are kept verbatim in the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocketFrame {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl SocketFrame {
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}
