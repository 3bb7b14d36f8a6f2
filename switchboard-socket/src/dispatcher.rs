//! Event dispatch: routes inbound events to registered handlers.
//!
//! A [`Dispatcher`] maps an [`EventKind`] to one handler. Handlers come in
//! three shapes, fixed per kind and checked when they are registered:
//!
//! - `connect`: `(ctx, Option<AuthPayload>)`, may reject the session
//! - `disconnect`: `(ctx)`
//! - every other kind: `(ctx, Option<Value>)`
//!
//! The dispatcher is generic over the context handed to handlers: the server
//! passes a [`Socket`](crate::Socket), the client a
//! [`ClientContext`](crate::ClientContext).

use crate::error::{HandlerResult, SocketError};
use crate::event::{AuthPayload, EventKind};
use crate::session::SessionId;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// Context handed to handlers on either side.
pub trait HandlerContext: Clone + Send + Sync + 'static {
    /// Session the event belongs to, if one is established.
    fn session_id(&self) -> Option<SessionId>;
}

/// Handler for payload-carrying events.
#[async_trait]
pub trait EventHandler<C>: Send + Sync + 'static {
    /// Handle one event.
    async fn handle(&self, ctx: C, data: Option<Value>) -> HandlerResult;
}

/// Handler for the `connect` event. Returning an error rejects the session.
#[async_trait]
pub trait ConnectHandler<C>: Send + Sync + 'static {
    /// Handle a new session.
    async fn handle(&self, ctx: C, auth: Option<AuthPayload>) -> HandlerResult;
}

/// Handler for the `disconnect` event.
#[async_trait]
pub trait DisconnectHandler<C>: Send + Sync + 'static {
    /// Handle session teardown.
    async fn handle(&self, ctx: C) -> HandlerResult;
}

/// Adapts a closure to the handler traits.
struct FnHandler<F>(F);

#[async_trait]
impl<C, F, Fut> EventHandler<C> for FnHandler<F>
where
    C: Send + 'static,
    F: Fn(C, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: C, data: Option<Value>) -> HandlerResult {
        (self.0)(ctx, data).await
    }
}

#[async_trait]
impl<C, F, Fut> ConnectHandler<C> for FnHandler<F>
where
    C: Send + 'static,
    F: Fn(C, Option<AuthPayload>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: C, auth: Option<AuthPayload>) -> HandlerResult {
        (self.0)(ctx, auth).await
    }
}

#[async_trait]
impl<C, F, Fut> DisconnectHandler<C> for FnHandler<F>
where
    C: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: C) -> HandlerResult {
        (self.0)(ctx).await
    }
}

/// Registration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The handler shape does not fit the event kind
    #[error("`{0}` needs a dedicated handler; use on_connect or on_disconnect")]
    ArityMismatch(EventKind),

    /// Custom events need a name
    #[error("Event name cannot be empty")]
    EmptyName,
}

enum Handler<C> {
    Connect(Arc<dyn ConnectHandler<C>>),
    Disconnect(Arc<dyn DisconnectHandler<C>>),
    Event(Arc<dyn EventHandler<C>>),
}

impl<C> Clone for Handler<C> {
    fn clone(&self) -> Self {
        match self {
            Handler::Connect(h) => Handler::Connect(Arc::clone(h)),
            Handler::Disconnect(h) => Handler::Disconnect(Arc::clone(h)),
            Handler::Event(h) => Handler::Event(Arc::clone(h)),
        }
    }
}

/// Event kind → handler registry.
pub struct Dispatcher<C> {
    handlers: HashMap<EventKind, Handler<C>>,
}

impl<C: HandlerContext> Dispatcher<C> {
    /// Create a dispatcher with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a closure for a payload-carrying event.
    ///
    /// Replaces any handler already bound to `kind`.
    pub fn on<F, Fut>(&mut self, kind: impl Into<EventKind>, f: F) -> Result<&mut Self, DispatchError>
    where
        F: Fn(C, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_handler(kind, FnHandler(f))
    }

    /// Register a handler value for a payload-carrying event.
    pub fn on_handler<H: EventHandler<C>>(
        &mut self,
        kind: impl Into<EventKind>,
        handler: H,
    ) -> Result<&mut Self, DispatchError> {
        let kind = kind.into().normalized();
        if kind.is_lifecycle() {
            return Err(DispatchError::ArityMismatch(kind));
        }
        if kind.as_str().is_empty() {
            return Err(DispatchError::EmptyName);
        }
        self.handlers.insert(kind, Handler::Event(Arc::new(handler)));
        Ok(self)
    }

    /// Bind a built-in payload event. `kind` is never `connect` or `disconnect`.
    pub(crate) fn bind_event<F, Fut>(&mut self, kind: EventKind, f: F) -> &mut Self
    where
        F: Fn(C, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        debug_assert!(!kind.is_lifecycle());
        self.handlers
            .insert(kind.normalized(), Handler::Event(Arc::new(FnHandler(f))));
        self
    }

    /// Register the `connect` handler.
    pub fn on_connect<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(C, Option<AuthPayload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_connect_handler(FnHandler(f))
    }

    /// Register a handler value for `connect`.
    pub fn on_connect_handler<H: ConnectHandler<C>>(&mut self, handler: H) -> &mut Self {
        self.handlers
            .insert(EventKind::Connect, Handler::Connect(Arc::new(handler)));
        self
    }

    /// Register the `disconnect` handler.
    pub fn on_disconnect<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_disconnect_handler(FnHandler(f))
    }

    /// Register a handler value for `disconnect`.
    pub fn on_disconnect_handler<H: DisconnectHandler<C>>(&mut self, handler: H) -> &mut Self {
        self.handlers
            .insert(EventKind::Disconnect, Handler::Disconnect(Arc::new(handler)));
        self
    }

    /// Remove the handler bound to `kind`.
    pub fn off(&mut self, kind: impl Into<EventKind>) -> bool {
        self.handlers.remove(&kind.into().normalized()).is_some()
    }

    /// Check whether `kind` has a handler.
    pub fn contains(&self, kind: &EventKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.handlers.keys().cloned().collect()
    }

    /// Route a payload-carrying event.
    ///
    /// Returns `true` if a handler ran. Unknown kinds are dropped; handler
    /// failures and panics are logged and absorbed.
    pub async fn dispatch(&self, kind: &EventKind, ctx: C, data: Option<Value>) -> bool {
        let handler = match self.handlers.get(kind) {
            Some(Handler::Event(handler)) => Arc::clone(handler),
            Some(_) => {
                tracing::warn!(
                    session_id = ?ctx.session_id(),
                    event = %kind,
                    "Lifecycle event arrived as a regular event, dropping"
                );
                return false;
            }
            None => {
                tracing::debug!(session_id = ?ctx.session_id(), event = %kind, "No handler, dropping event");
                return false;
            }
        };

        let session_id = ctx.session_id();
        let outcome = AssertUnwindSafe(handler.handle(ctx, data))
            .catch_unwind()
            .await;
        log_outcome(kind, session_id, outcome);
        true
    }

    /// Run the `connect` handler. No handler means the session is accepted.
    ///
    /// A panicking handler counts as a rejection.
    pub async fn connect(&self, ctx: C, auth: Option<AuthPayload>) -> HandlerResult {
        let Some(Handler::Connect(handler)) = self.handlers.get(&EventKind::Connect) else {
            return Ok(());
        };
        let handler = Arc::clone(handler);

        match AssertUnwindSafe(handler.handle(ctx, auth)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(SocketError::Handler("connect handler panicked".to_string())),
        }
    }

    /// Run the `disconnect` handler, if any.
    pub async fn disconnect(&self, ctx: C) {
        let Some(Handler::Disconnect(handler)) = self.handlers.get(&EventKind::Disconnect) else {
            return;
        };
        let handler = Arc::clone(handler);
        let session_id = ctx.session_id();

        let outcome = AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await;
        log_outcome(&EventKind::Disconnect, session_id, outcome);
    }
}

fn log_outcome(
    kind: &EventKind,
    session_id: Option<SessionId>,
    outcome: Result<HandlerResult, Box<dyn std::any::Any + Send>>,
) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(session_id = ?session_id, event = %kind, error = %e, "Event handler failed");
        }
        Err(_) => {
            tracing::error!(session_id = ?session_id, event = %kind, "Event handler panicked");
        }
    }
}

impl<C: HandlerContext> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

/// Extract the room name carried by `join` / `leave`.
pub(crate) fn room_name(kind: &EventKind, data: Option<&Value>) -> Result<String, SocketError> {
    match data {
        Some(Value::String(room)) if !room.is_empty() => Ok(room.clone()),
        _ => Err(SocketError::InvalidPayload(format!(
            "`{kind}` expects a room name string"
        ))),
    }
}
