//! Reconnecting socket client.
//!
//! [`SocketClient::spawn`] moves the connection into a background task and
//! hands back a [`ClientHandle`]. The task owns the socket; callers only
//! enqueue work, so `emit` never blocks.

use crate::dispatcher::{Dispatcher, HandlerContext};
use crate::error::{SocketError, SocketResult};
use crate::event::{AuthPayload, EventKind};
use crate::packet::{next_packet, Packet};
use crate::session::SessionId;
use futures_util::{Sink, SinkExt, StreamExt};
use http::{HeaderName, HeaderValue};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How the client retries failed or dropped connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retry at all
    pub enabled: bool,
    /// Delay before the first retry
    pub delay: Duration,
    /// Upper bound for the doubled delay
    pub max_delay: Duration,
    /// Total handshake attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Number of handshake attempts this policy allows.
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Delay before attempt `attempt` (1-based).
    ///
    /// The first attempt goes out immediately; attempt `k` waits
    /// `delay * 2^(k-2)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        let cap = self.max_delay.max(self.delay);
        self.delay.saturating_mul(factor).min(cap)
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL (`http`, `https`, `ws` or `wss`)
    pub server_url: String,
    /// Path of the WebSocket endpoint
    pub path: String,
    /// Extra headers sent with the upgrade request
    pub headers: Vec<(String, String)>,
    /// Credentials sent in the connect packet
    pub auth: Option<AuthPayload>,
    /// Retry behaviour
    pub reconnect: ReconnectPolicy,
    /// Timeout for one handshake attempt
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Configuration for a server URL with default settings.
    pub fn new<S: Into<String>>(server_url: S) -> Self {
        Self {
            server_url: server_url.into(),
            path: "/socket.io".to_string(),
            headers: Vec::new(),
            auth: None,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(20),
        }
    }

    /// Set the endpoint path.
    pub fn path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = path.into();
        self
    }

    /// Add an upgrade request header.
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the connect credentials.
    pub fn auth(mut self, auth: AuthPayload) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Present a bearer token both as a header and in the connect credentials.
    pub fn token<S: Into<String>>(self, token: S) -> Self {
        let token = token.into();
        let mut auth = self.auth.clone().unwrap_or_default();
        auth.insert("token".to_string(), Value::String(token.clone()));
        self.header("Authorization", format!("Bearer {}", token))
            .auth(auth)
    }

    /// Set the retry policy.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the per-attempt handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The WebSocket URL the client dials.
    pub fn endpoint(&self) -> SocketResult<Url> {
        let mut url =
            Url::parse(&self.server_url).map_err(|e| SocketError::InvalidUrl(e.to_string()))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(SocketError::InvalidUrl(format!(
                    "unsupported scheme `{}`",
                    other
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| SocketError::InvalidUrl(format!("cannot use scheme `{}`", scheme)))?;

        let path = self.path.trim_matches('/');
        if path.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(&format!("/{}/", path));
        }
        Ok(url)
    }
}

/// Client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not started
    Idle,
    /// Handshake or retry in progress
    Connecting,
    /// Session established
    Open,
    /// Shutting down
    Closing,
    /// Finished, for good
    Closed,
}

#[derive(Debug)]
enum Command {
    Emit {
        event: EventKind,
        data: Option<Value>,
    },
    Close,
}

struct ClientShared {
    state: watch::Sender<ClientState>,
    sid: RwLock<Option<SessionId>>,
    failed_attempts: AtomicU32,
}

impl ClientShared {
    fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ClientState) {
        self.state.send_replace(state);
    }
}

fn submit(
    commands: &mpsc::UnboundedSender<Command>,
    shared: &ClientShared,
    event: EventKind,
    data: Option<Value>,
) -> bool {
    if matches!(shared.state(), ClientState::Closing | ClientState::Closed) {
        tracing::info!(event = %event, "Client closed, dropping event");
        return false;
    }
    commands.send(Command::Emit { event, data }).is_ok()
}

/// What a client handler gets.
#[derive(Clone)]
pub struct ClientContext {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<ClientShared>,
}

impl ClientContext {
    /// Session id assigned by the server, while connected.
    pub fn id(&self) -> Option<SessionId> {
        self.shared.sid.read().clone()
    }

    /// Send an event to the server.
    pub fn emit(&self, event: impl Into<EventKind>, data: Option<Value>) -> bool {
        submit(&self.commands, &self.shared, event.into(), data)
    }

    /// Whether the session is open right now.
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ClientState::Open
    }

    /// Close the client.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

impl HandlerContext for ClientContext {
    fn session_id(&self) -> Option<SessionId> {
        self.id()
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("sid", &self.id())
            .field("state", &self.shared.state())
            .finish()
    }
}

impl Dispatcher<ClientContext> {
    /// Dispatcher with the stock client behaviour: log the session lifecycle
    /// and `message` payloads.
    pub fn with_client_defaults() -> Self {
        let mut dispatcher = Self::new();

        dispatcher
            .on_connect(|ctx: ClientContext, _auth| async move {
                tracing::info!(session_id = ?ctx.id(), "Socket connected to server");
                Ok(())
            })
            .on_disconnect(|ctx: ClientContext| async move {
                tracing::info!(session_id = ?ctx.id(), "Socket disconnected from server");
                Ok(())
            });

        dispatcher.bind_event(EventKind::Connected, |ctx: ClientContext, _| async move {
            tracing::debug!(session_id = ?ctx.id(), "Server confirmed session");
            Ok(())
        });

        dispatcher.bind_event(EventKind::Message, |ctx: ClientContext, data| async move {
            tracing::info!(session_id = ?ctx.id(), data = ?data, "Message from server");
            Ok(())
        });

        dispatcher
    }
}

/// Socket client.
pub struct SocketClient {
    config: ClientConfig,
    dispatcher: Dispatcher<ClientContext>,
}

impl SocketClient {
    /// Client with the default handlers.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_dispatcher(config, Dispatcher::with_client_defaults())
    }

    /// Client with custom handlers.
    pub fn with_dispatcher(config: ClientConfig, dispatcher: Dispatcher<ClientContext>) -> Self {
        Self { config, dispatcher }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handlers, for registration before the client starts.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<ClientContext> {
        &mut self.dispatcher
    }

    /// Start connecting in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> ClientHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ClientState::Idle);
        let shared = Arc::new(ClientShared {
            state,
            sid: RwLock::new(None),
            failed_attempts: AtomicU32::new(0),
        });

        let driver = Driver {
            config: Arc::new(self.config),
            dispatcher: Arc::new(self.dispatcher),
            context: ClientContext {
                commands: commands.clone(),
                shared: Arc::clone(&shared),
            },
            shared: Arc::clone(&shared),
            commands: rx,
            pending: VecDeque::new(),
        };
        let task = tokio::spawn(driver.run());

        ClientHandle {
            commands,
            shared,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Caller-side handle to a running client.
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<ClientShared>,
    task: Mutex<Option<JoinHandle<SocketResult<()>>>>,
}

impl ClientHandle {
    /// Send an event to the server.
    ///
    /// Events submitted while the client is connecting go out once the
    /// session opens. Returns `false` once the client is closing.
    pub fn emit(&self, event: impl Into<EventKind>, data: Option<Value>) -> bool {
        submit(&self.commands, &self.shared, event.into(), data)
    }

    /// Point-in-time liveness probe.
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ClientState::Open
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Session id assigned by the server, while connected.
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.sid.read().clone()
    }

    /// Handshake attempts that failed so far.
    pub fn failed_attempts(&self) -> u32 {
        self.shared.failed_attempts.load(Ordering::Acquire)
    }

    /// Close the session and stop retrying.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Resolves once the client reached [`ClientState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == ClientState::Closed).await;
    }

    /// Wait for the background task and return its outcome.
    ///
    /// Only the first call observes the outcome; later calls return `Ok(())`.
    pub async fn wait(&self) -> SocketResult<()> {
        let Some(task) = self.task.lock().take() else {
            self.closed().await;
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => Err(SocketError::Connection(format!("client task failed: {}", e))),
        }
    }
}

enum Phase {
    Connected(Connection),
    Cancelled,
    Failed(SocketError),
}

struct Connection {
    ws: WsStream,
    sid: SessionId,
    early: Vec<Packet>,
}

enum SessionEnd {
    LocalClose,
    ServerDisconnect,
    Lost(String),
}

struct Driver {
    config: Arc<ClientConfig>,
    dispatcher: Arc<Dispatcher<ClientContext>>,
    context: ClientContext,
    shared: Arc<ClientShared>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: VecDeque<Packet>,
}

impl Driver {
    async fn run(mut self) -> SocketResult<()> {
        let mut after_loss = false;
        let result = loop {
            let connection = match self.connect_with_retry(after_loss).await {
                Phase::Connected(connection) => connection,
                Phase::Cancelled => break Ok(()),
                Phase::Failed(e) => break Err(e),
            };

            match self.serve(connection).await {
                SessionEnd::LocalClose | SessionEnd::ServerDisconnect => break Ok(()),
                SessionEnd::Lost(reason) if !self.config.reconnect.enabled => {
                    break Err(SocketError::ConnectionLost(reason));
                }
                SessionEnd::Lost(reason) => {
                    tracing::warn!(reason = %reason, "Connection lost, reconnecting");
                    after_loss = true;
                }
            }
        };

        *self.shared.sid.write() = None;
        self.shared.set_state(ClientState::Closed);
        result
    }

    /// Buffer an emit submitted while no session is open. `false` means stop.
    fn buffer(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Emit { event, data }) => {
                self.pending.push_back(Packet::event(event, data));
                true
            }
            Some(Command::Close) | None => false,
        }
    }

    async fn idle(&mut self, wait: Duration) -> bool {
        let sleep = tokio::time::sleep(wait);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => {
                    if !self.buffer(command) {
                        return false;
                    }
                }
            }
        }
    }

    async fn connect_with_retry(&mut self, after_loss: bool) -> Phase {
        let policy = self.config.reconnect.clone();
        let attempts = policy.attempts();

        for attempt in 1..=attempts {
            // after a dropped session every attempt waits, including the first
            let wait = policy.delay_for(if after_loss { attempt + 1 } else { attempt });
            if !wait.is_zero() {
                tracing::info!(attempt, max_attempts = attempts, delay = ?wait, "Retrying connection");
                if !self.idle(wait).await {
                    return Phase::Cancelled;
                }
            }

            self.shared.set_state(ClientState::Connecting);
            let config = Arc::clone(&self.config);
            let handshake = tokio::time::timeout(config.connect_timeout, handshake(&config));
            tokio::pin!(handshake);

            let outcome = loop {
                tokio::select! {
                    outcome = &mut handshake => break outcome,
                    command = self.commands.recv() => {
                        if !self.buffer(command) {
                            return Phase::Cancelled;
                        }
                    }
                }
            };

            let error = match outcome {
                Ok(Ok(connection)) => return Phase::Connected(connection),
                Ok(Err(e)) => e,
                Err(_) => SocketError::Timeout,
            };
            self.shared.failed_attempts.fetch_add(1, Ordering::AcqRel);
            tracing::warn!(attempt, max_attempts = attempts, error = %error, "Connection failed.");

            if matches!(error, SocketError::InvalidUrl(_) | SocketError::InvalidHeader(_)) {
                return Phase::Failed(error);
            }
        }

        tracing::error!(attempts, "Giving up on the server");
        Phase::Failed(SocketError::ReconnectExhausted { attempts })
    }

    async fn serve(&mut self, connection: Connection) -> SessionEnd {
        let Connection { ws, sid, early } = connection;
        *self.shared.sid.write() = Some(sid.clone());
        self.shared.set_state(ClientState::Open);
        tracing::info!(session_id = %sid, "Connected to the server");

        let ctx = self.context.clone();
        if let Err(e) = self.dispatcher.connect(ctx.clone(), self.config.auth.clone()).await {
            tracing::warn!(session_id = %sid, error = %e, "Connect handler failed");
        }

        let end = self.session_loop(ws, &ctx, early).await;
        if matches!(end, SessionEnd::Lost(_)) {
            let next = if self.config.reconnect.enabled {
                ClientState::Connecting
            } else {
                ClientState::Closing
            };
            self.shared.set_state(next);
        }

        self.dispatcher.disconnect(ctx).await;
        *self.shared.sid.write() = None;
        end
    }

    async fn session_loop(&mut self, ws: WsStream, ctx: &ClientContext, early: Vec<Packet>) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();

        while let Some(packet) = self.pending.front() {
            if let Err(e) = send_packet(&mut sink, packet).await {
                return SessionEnd::Lost(e.to_string());
            }
            self.pending.pop_front();
        }

        for packet in early {
            if let Some(end) = self.inbound(ctx, packet).await {
                return end;
            }
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Emit { event, data }) => {
                        if let Err(e) = send_packet(&mut sink, &Packet::event(event, data)).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                    }
                    Some(Command::Close) | None => {
                        self.shared.set_state(ClientState::Closing);
                        let _ = send_packet(&mut sink, &Packet::Disconnect).await;
                        let _ = sink.close().await;
                        tracing::info!("Client disconnected");
                        return SessionEnd::LocalClose;
                    }
                },
                frame = stream.next() => match frame {
                    None => return SessionEnd::Lost("connection closed".to_string()),
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    Some(Ok(message)) => match Packet::from_message(&message) {
                        Ok(Some(packet)) => {
                            if let Some(end) = self.inbound(ctx, packet).await {
                                let _ = sink.close().await;
                                return end;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Malformed frame from server");
                        }
                    },
                },
            }
        }
    }

    async fn inbound(&mut self, ctx: &ClientContext, packet: Packet) -> Option<SessionEnd> {
        match packet {
            Packet::Event { event, data } => {
                self.dispatcher.dispatch(&event, ctx.clone(), data).await;
                None
            }
            Packet::Disconnect => {
                tracing::info!("Server closed the session");
                self.shared.set_state(ClientState::Closing);
                Some(SessionEnd::ServerDisconnect)
            }
            other => {
                tracing::debug!(packet = other.kind(), "Ignoring unexpected packet");
                None
            }
        }
    }
}

async fn send_packet<S>(sink: &mut S, packet: &Packet) -> SocketResult<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(packet.to_message()?).await?;
    Ok(())
}

/// One handshake attempt: upgrade, send `connect`, wait for the verdict.
async fn handshake(config: &ClientConfig) -> SocketResult<Connection> {
    let endpoint = config.endpoint()?;
    let mut request = endpoint.as_str().into_client_request()?;
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SocketError::InvalidHeader(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| SocketError::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert(name, value);
    }

    tracing::debug!(url = %endpoint, "Connecting");
    let (mut ws, _response) = connect_async(request).await?;
    send_packet(
        &mut ws,
        &Packet::Connect {
            auth: config.auth.clone(),
        },
    )
    .await?;

    let mut early = Vec::new();
    loop {
        match next_packet(&mut ws).await? {
            Some(Packet::ConnectAck { sid }) => return Ok(Connection { ws, sid, early }),
            Some(Packet::ConnectError { message }) => return Err(SocketError::Rejected(message)),
            Some(packet @ Packet::Event { .. }) => early.push(packet),
            Some(Packet::Disconnect) | None => {
                return Err(SocketError::Connection(
                    "server closed the connection during the handshake".to_string(),
                ));
            }
            Some(other) => {
                return Err(SocketError::UnexpectedPacket(format!(
                    "expected connect_ack, got {}",
                    other.kind()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults_bind_every_stock_event() {
        let dispatcher = Dispatcher::<ClientContext>::with_client_defaults();
        for kind in [
            EventKind::Connect,
            EventKind::Disconnect,
            EventKind::Connected,
            EventKind::Message,
        ] {
            assert!(dispatcher.contains(&kind), "missing {kind:?}");
        }
    }

    #[test]
    fn test_first_attempt_is_immediate_then_doubles() {
        let policy = ReconnectPolicy {
            delay: Duration::from_secs(1),
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_never_below_base() {
        let policy = ReconnectPolicy {
            delay: Duration::from_secs(10),
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
    }

    #[test]
    fn test_attempt_bounds() {
        assert_eq!(ReconnectPolicy::default().attempts(), 10);
        assert_eq!(ReconnectPolicy::disabled().attempts(), 1);
        let zero = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(zero.attempts(), 1);
    }

    #[test]
    fn test_endpoint_maps_http_to_ws() {
        let config = ClientConfig::new("http://0.0.0.0:1234");
        assert_eq!(
            config.endpoint().unwrap().as_str(),
            "ws://0.0.0.0:1234/socket.io/"
        );

        let config = ClientConfig::new("https://example.com").path("events/");
        assert_eq!(config.endpoint().unwrap().as_str(), "wss://example.com/events/");
    }

    #[test]
    fn test_endpoint_rejects_bad_urls() {
        assert!(matches!(
            ClientConfig::new("not a url").endpoint(),
            Err(SocketError::InvalidUrl(_))
        ));
        assert!(matches!(
            ClientConfig::new("ftp://example.com").endpoint(),
            Err(SocketError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_token_sets_header_and_auth() {
        let config = ClientConfig::new("http://localhost:1234").token("test");
        assert_eq!(
            config.headers,
            vec![("Authorization".to_string(), "Bearer test".to_string())]
        );
        assert_eq!(
            config.auth.unwrap().get("token"),
            Some(&Value::String("test".into()))
        );
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_retrying() {
        let config = ClientConfig::new("ftp://example.com").reconnect(ReconnectPolicy {
            delay: Duration::from_millis(1),
            ..ReconnectPolicy::default()
        });
        let handle = SocketClient::new(config).spawn();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, SocketError::InvalidUrl(_)));
        assert_eq!(handle.failed_attempts(), 1);
        assert_eq!(handle.state(), ClientState::Closed);
        assert!(!handle.emit(EventKind::Message, None));
    }
}
