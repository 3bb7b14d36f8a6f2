//! Transport sessions.

use crate::error::{SocketError, SocketResult};
use crate::event::{AuthPayload, EventKind};
use crate::packet::Packet;
use futures_util::{Sink, SinkExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tungstenite::Message;

/// Unique identifier for a session.
pub type SessionId = String;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in progress
    Connecting,
    /// Session is open and ready
    Open,
    /// Session is closing
    Closing,
    /// Session is closed
    Closed,
}

/// What the server saw of the upgrade request that opened a session.
#[derive(Debug, Clone, Default)]
pub struct HandshakeInfo {
    /// Request path
    pub path: String,
    /// Raw query string
    pub query: Option<String>,
    /// Request headers, lowercased names
    pub headers: HashMap<String, String>,
    /// Remote address
    pub remote_addr: Option<SocketAddr>,
}

impl HandshakeInfo {
    /// Look up a header by name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Server-side view of one client session.
///
/// Cloning is cheap; all clones share state and the outbound queue.
#[derive(Clone)]
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    handshake: Arc<HandshakeInfo>,
    auth: Option<Arc<AuthPayload>>,
    state: Arc<RwLock<SessionState>>,
    torn_down: Arc<AtomicBool>,
    closing: Arc<Notify>,
    tx: mpsc::UnboundedSender<Message>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        handshake: HandshakeInfo,
        auth: Option<AuthPayload>,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            id,
            handshake: Arc::new(handshake),
            auth: auth.map(Arc::new),
            state: Arc::new(RwLock::new(SessionState::Connecting)),
            torn_down: Arc::new(AtomicBool::new(false)),
            closing: Arc::new(Notify::new()),
            tx,
        }
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the session state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Check if the session is open.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Credentials the client presented at connect time.
    pub fn auth(&self) -> Option<&AuthPayload> {
        self.auth.as_deref()
    }

    /// Upgrade request details.
    pub fn handshake(&self) -> &HandshakeInfo {
        &self.handshake
    }

    /// Queue an event for this session.
    ///
    /// Returns `false` when the session no longer accepts frames; that is
    /// logged and otherwise ignored.
    pub fn emit(&self, event: impl Into<EventKind>, data: Option<Value>) -> bool {
        let packet = Packet::event(event, data);
        match packet.to_message() {
            Ok(message) => self.deliver(message),
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Failed to encode event");
                false
            }
        }
    }

    /// Queue an already encoded frame. Used by fan-out so a broadcast is encoded once.
    pub(crate) fn deliver(&self, message: Message) -> bool {
        if matches!(self.state(), SessionState::Closing | SessionState::Closed) {
            tracing::info!(session_id = %self.id, "Session closed, dropping frame");
            return false;
        }
        self.enqueue(message)
    }

    pub(crate) fn send_packet(&self, packet: &Packet) -> bool {
        match packet.to_message() {
            Ok(message) => self.enqueue(message),
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Failed to encode packet");
                false
            }
        }
    }

    fn enqueue(&self, message: Message) -> bool {
        if self.tx.send(message).is_err() {
            tracing::info!(session_id = %self.id, "Session writer gone, dropping frame");
            return false;
        }
        true
    }

    /// Close the session from the server side.
    ///
    /// The client is told to disconnect and the read loop is woken up so the
    /// usual teardown runs.
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, SessionState::Closing | SessionState::Closed) {
                return;
            }
            *state = SessionState::Closing;
        }
        self.send_packet(&Packet::Disconnect);
        self.enqueue(Message::Close(None));
        self.closing.notify_one();
    }

    /// Set the session state (internal use).
    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub(crate) async fn closed(&self) {
        self.closing.notified().await;
    }

    /// Claims the right to run teardown. Only the first caller gets `true`.
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Manages the write side of a session.
pub(crate) struct SessionWriter<S> {
    sink: S,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl<S> SessionWriter<S>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    pub fn new(sink: S, rx: mpsc::UnboundedReceiver<Message>) -> Self {
        Self { sink, rx }
    }

    /// Drain the queue into the socket until a close frame goes out.
    pub async fn run(mut self) -> SocketResult<()> {
        while let Some(message) = self.rx.recv().await {
            let is_close = message.is_close();

            if let Err(e) = self.sink.send(message).await {
                tracing::debug!(error = %e, "Failed to write session frame");
                return Err(SocketError::Protocol(e));
            }

            if is_close {
                break;
            }
        }

        let _ = self.sink.close().await;
        Ok(())
    }
}
