//! Event names understood on both sides of a session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key/value credentials a client sends once at connect time.
pub type AuthPayload = serde_json::Map<String, serde_json::Value>;

/// Kind of an event travelling over a session.
///
/// The built-in kinds map to fixed wire names (`connect`, `disconnect`,
/// `connected`, `join`, `leave`, `message`). Anything else is carried as
/// [`EventKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A session was established
    Connect,
    /// A session was torn down
    Disconnect,
    /// Server acknowledgement sent to a freshly accepted session
    Connected,
    /// Request to join a room
    Join,
    /// Request to leave a room
    Leave,
    /// Generic payload passthrough
    Message,
    /// Application-defined event
    Custom(String),
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::Connected => "connected",
            EventKind::Join => "join",
            EventKind::Leave => "leave",
            EventKind::Message => "message",
            EventKind::Custom(name) => name,
        }
    }

    /// Connection lifecycle kinds take a dedicated handler shape.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, EventKind::Connect | EventKind::Disconnect)
    }

    /// Re-parse a custom name so `Custom("join")` becomes `Join`.
    pub fn normalized(self) -> Self {
        match self {
            EventKind::Custom(name) => EventKind::from(name),
            kind => kind,
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name {
            "connect" => EventKind::Connect,
            "disconnect" => EventKind::Disconnect,
            "connected" => EventKind::Connected,
            "join" => EventKind::Join,
            "leave" => EventKind::Leave,
            "message" => EventKind::Message,
            other => EventKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "connect" | "disconnect" | "connected" | "join" | "leave" | "message" => {
                EventKind::from(name.as_str())
            }
            _ => EventKind::Custom(name),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Custom(name) => name,
            kind => kind.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
