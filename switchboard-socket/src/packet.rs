//! JSON packets exchanged over a WebSocket session.
//!
//! Each text frame carries exactly one packet, tagged by `type`:
//!
//! ```json
//! {"type":"connect","auth":{"token":"abc"}}
//! {"type":"connect_ack","sid":"5b0c..."}
//! {"type":"event","event":"join","data":"room1"}
//! {"type":"disconnect"}
//! ```

use crate::error::{SocketError, SocketResult};
use crate::event::{AuthPayload, EventKind};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tungstenite::Message;

/// A protocol packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    /// Client opens a session, optionally presenting credentials
    Connect {
        /// Opaque credentials
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<AuthPayload>,
    },
    /// Server accepted the session and assigned it an id
    ConnectAck {
        /// Session id assigned by the server
        sid: String,
    },
    /// Server refused the session
    ConnectError {
        /// Reason given by the connect handler
        message: String,
    },
    /// A named event with an optional payload
    Event {
        /// Event name
        event: EventKind,
        /// Event payload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Either side is ending the session
    Disconnect,
}

impl Packet {
    /// Build an event packet.
    pub fn event(event: impl Into<EventKind>, data: Option<Value>) -> Self {
        Packet::Event {
            event: event.into(),
            data,
        }
    }

    /// Encode into a WebSocket text frame.
    pub fn to_message(&self) -> SocketResult<Message> {
        let json = serde_json::to_string(self)?;
        Ok(Message::text(json))
    }

    /// Decode a packet from the text of a frame.
    pub fn decode(text: &str) -> SocketResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a packet from a WebSocket frame. Control and binary frames yield `None`.
    pub fn from_message(message: &Message) -> SocketResult<Option<Self>> {
        match message {
            Message::Text(text) => Self::decode(text.as_str()).map(Some),
            Message::Close(_) => Ok(Some(Packet::Disconnect)),
            Message::Binary(_) => Err(SocketError::UnexpectedPacket(
                "binary frames are not supported".to_string(),
            )),
            _ => Ok(None),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "connect",
            Packet::ConnectAck { .. } => "connect_ack",
            Packet::ConnectError { .. } => "connect_error",
            Packet::Event { .. } => "event",
            Packet::Disconnect => "disconnect",
        }
    }
}

/// Read frames until one carries a packet. `None` once the stream ends.
pub(crate) async fn next_packet<S>(stream: &mut S) -> SocketResult<Option<Packet>>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let message = frame?;
        if let Some(packet) = Packet::from_message(&message)? {
            return Ok(Some(packet));
        }
    }
    Ok(None)
}
