use serde::Serialize;
use serde_json::{json, Value};

/// One fan-out message. Each variant names the SSE `event:` field and
/// carries its own `data:` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum SseEvent {
    Connected {
        client_id: Option<String>,
    },
    Position {
        step: u16,
        beat: u16,
        bar: u16,
    },
    Status {
        state: String,
        bpm: f64,
    },
    Tracks {
        active_track_ids: Vec<String>,
    },
    ClientMetadataUpdated {
        client_id: String,
    },
    ClientConnected {
        client_id: String,
    },
    ClientDisconnected {
        client_id: String,
    },
    Error {
        message: String,
    },
    Heartbeat,
    /// Synthetic marker sent in place of an event dropped because a
    /// subscriber's queue was full.
    Lag {
        dropped: u64,
    },
}

impl SseEvent {
    /// The SSE `event:` field name.
    pub fn name(&self) -> &'static str {
        match self {
            SseEvent::Connected { .. } => "connected",
            SseEvent::Position { .. } => "position",
            SseEvent::Status { .. } => "status",
            SseEvent::Tracks { .. } => "tracks",
            SseEvent::ClientMetadataUpdated { .. } => "client_metadata_updated",
            SseEvent::ClientConnected { .. } => "client_connected",
            SseEvent::ClientDisconnected { .. } => "client_disconnected",
            SseEvent::Error { .. } => "error",
            SseEvent::Heartbeat => "heartbeat",
            SseEvent::Lag { .. } => "lag",
        }
    }

    /// The JSON `data:` payload, without the `kind` discriminant (the event
    /// name already communicates that).
    pub fn data(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            map.remove("kind");
        }
        value
    }
}
