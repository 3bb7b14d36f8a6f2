//! Server-side handler context.

use crate::dispatcher::{room_name, Dispatcher, HandlerContext};
use crate::event::{AuthPayload, EventKind};
use crate::room::{RoomId, RoomRegistry, Target};
use crate::session::{HandshakeInfo, Session, SessionId, SessionState};
use serde_json::Value;
use std::sync::Arc;

/// What a server handler gets: its own session plus the room registry.
#[derive(Clone)]
pub struct Socket {
    session: Session,
    registry: Arc<RoomRegistry>,
}

impl Socket {
    pub(crate) fn new(session: Session, registry: Arc<RoomRegistry>) -> Self {
        Self { session, registry }
    }

    /// Session id.
    pub fn id(&self) -> &str {
        self.session.id()
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Credentials presented at connect time.
    pub fn auth(&self) -> Option<&AuthPayload> {
        self.session.auth()
    }

    /// Upgrade request details.
    pub fn handshake(&self) -> &HandshakeInfo {
        self.session.handshake()
    }

    /// Emit an event to this session only.
    pub fn emit(&self, event: impl Into<EventKind>, data: Option<Value>) -> bool {
        self.session.emit(event, data)
    }

    /// Emit an event to a target. Returns the number of sessions reached.
    pub fn emit_to(&self, target: &Target, event: impl Into<EventKind>, data: Option<Value>) -> usize {
        self.registry.emit(target, event, data)
    }

    /// Join a room.
    pub fn join(&self, room: &str) -> bool {
        self.registry.join(self.id(), room)
    }

    /// Leave a room.
    pub fn leave(&self, room: &str) -> bool {
        self.registry.leave(self.id(), room)
    }

    /// Rooms this session belongs to.
    pub fn rooms(&self) -> Vec<RoomId> {
        self.registry.rooms_of(self.id())
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Disconnect this session from the server side.
    pub fn disconnect(&self) {
        self.session.close();
    }
}

impl HandlerContext for Socket {
    fn session_id(&self) -> Option<SessionId> {
        Some(self.session.id.clone())
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket").field("session", &self.session).finish()
    }
}

impl Dispatcher<Socket> {
    /// Dispatcher with the stock server behaviour: log connections, apply
    /// `join`/`leave` to the registry, log `message` payloads.
    pub fn with_server_defaults() -> Self {
        let mut dispatcher = Self::new();

        dispatcher
            .on_connect(|socket: Socket, auth: Option<AuthPayload>| async move {
                tracing::debug!(session_id = %socket.id(), handshake = ?socket.handshake(), "Handshake");
                tracing::info!(session_id = %socket.id(), "Socket connected");
                match auth {
                    Some(auth) => tracing::info!(session_id = %socket.id(), auth = ?auth, "Auth"),
                    None => tracing::info!(session_id = %socket.id(), "No auth"),
                }
                Ok(())
            })
            .on_disconnect(|socket: Socket| async move {
                tracing::info!(session_id = %socket.id(), "Socket disconnected");
                Ok(())
            });

        dispatcher.bind_event(EventKind::Join, |socket: Socket, data| async move {
            let room = room_name(&EventKind::Join, data.as_ref())?;
            socket.join(&room);
            tracing::info!(
                session_id = %socket.id(),
                room = %room,
                rooms = ?socket.rooms(),
                "Client joined room"
            );
            Ok(())
        });

        dispatcher.bind_event(EventKind::Leave, |socket: Socket, data| async move {
            let room = room_name(&EventKind::Leave, data.as_ref())?;
            socket.leave(&room);
            tracing::info!(
                session_id = %socket.id(),
                room = %room,
                rooms = ?socket.rooms(),
                "Client left room"
            );
            Ok(())
        });

        dispatcher.bind_event(EventKind::Message, |socket: Socket, data| async move {
            tracing::info!(session_id = %socket.id(), data = ?data, "Message from client");
            Ok(())
        });

        dispatcher
    }
}
