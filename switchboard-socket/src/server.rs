//! Socket server implementation.
//!
//! One TCP listener serves both the WebSocket endpoint (at the configured
//! path) and the administrative HTTP routes. Each accepted session gets a
//! read/dispatch task and a writer task.

use crate::admin;
use crate::dispatcher::Dispatcher;
use crate::error::{SocketError, SocketResult};
use crate::event::EventKind;
use crate::packet::{next_packet, Packet};
use crate::room::{RoomRegistry, Target};
use crate::session::{HandshakeInfo, Session, SessionState, SessionWriter};
use crate::socket::Socket;
use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tungstenite::handshake::derive_accept_key;
use tungstenite::protocol::Role;

/// Origins allowed to open a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorsOrigins {
    /// Any origin
    #[default]
    Any,
    /// Only the listed origins
    List(Vec<String>),
}

impl CorsOrigins {
    /// Parse `*` or a comma-separated origin list.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() || spec == "*" {
            return CorsOrigins::Any;
        }
        CorsOrigins::List(
            spec.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Check an `Origin` header value.
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            CorsOrigins::Any => true,
            CorsOrigins::List(origins) => origins.iter().any(|o| o == origin),
        }
    }

    /// Value for `Access-Control-Allow-Origin`, if any.
    pub(crate) fn allow_origin(&self, origin: Option<&str>) -> Option<String> {
        match (self, origin) {
            (CorsOrigins::Any, _) => Some("*".to_string()),
            (CorsOrigins::List(_), Some(origin)) if self.allows(origin) => Some(origin.to_string()),
            _ => None,
        }
    }
}

/// Socket server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Path of the WebSocket endpoint
    pub path: String,
    /// Origins allowed to connect
    pub cors_allowed_origins: CorsOrigins,
    /// Acknowledge the handshake before the connect handler runs
    pub always_connect: bool,
    /// How long a client may take to send its connect packet
    pub connect_timeout: Duration,
    /// How long teardown waits for queued frames to flush
    pub close_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            path: "/socket.io".to_string(),
            cors_allowed_origins: CorsOrigins::Any,
            always_connect: true,
            connect_timeout: Duration::from_secs(20),
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Whether a request path addresses the WebSocket endpoint.
    pub fn matches_path(&self, path: &str) -> bool {
        path.trim_end_matches('/') == self.path.trim_end_matches('/')
    }
}

/// Builder for socket server configuration.
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the bind address from a string.
    pub fn bind(mut self, addr: &str) -> SocketResult<Self> {
        self.config.bind_addr = addr
            .parse()
            .map_err(|e| SocketError::Server(format!("Invalid address: {}", e)))?;
        Ok(self)
    }

    /// Set the endpoint path.
    pub fn path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the allowed origins.
    pub fn cors_allowed_origins(mut self, origins: CorsOrigins) -> Self {
        self.config.cors_allowed_origins = origins;
        self
    }

    /// Acknowledge before or after the connect handler.
    ///
    /// With `true`, a session the connect handler rejects is closed and never
    /// sees the `disconnect` handler.
    pub fn always_connect(mut self, always: bool) -> Self {
        self.config.always_connect = always;
        self
    }

    /// Set the handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set how long a closing session may take to flush its queue.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Build the server with the given dispatcher.
    pub fn build(self, dispatcher: Dispatcher<Socket>) -> SocketServer {
        SocketServer::new(self.config, dispatcher)
    }
}

pub(crate) struct ServerShared {
    pub(crate) config: ServerConfig,
    pub(crate) dispatcher: Arc<Dispatcher<Socket>>,
    pub(crate) registry: Arc<RoomRegistry>,
}

/// Handle for pushing events into the server from outside a session.
#[derive(Clone)]
pub struct ServerHandle {
    registry: Arc<RoomRegistry>,
}

impl ServerHandle {
    /// Wrap a registry.
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast to a room. Returns the number of sessions reached.
    pub fn broadcast(&self, room: &str, event: impl Into<EventKind>, data: Option<Value>) -> usize {
        self.registry.broadcast(room, event, data)
    }

    /// Emit to a target.
    pub fn emit(&self, target: &Target, event: impl Into<EventKind>, data: Option<Value>) -> usize {
        self.registry.emit(target, event, data)
    }

    /// Disconnect a session from the server side.
    pub fn disconnect(&self, session_id: &str) -> bool {
        match self.registry.get_session(session_id) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}

/// Socket server.
pub struct SocketServer {
    shared: Arc<ServerShared>,
}

impl SocketServer {
    /// Create a new socket server.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher<Socket>) -> Self {
        Self {
            shared: Arc::new(ServerShared {
                config,
                dispatcher: Arc::new(dispatcher),
                registry: Arc::new(RoomRegistry::new()),
            }),
        }
    }

    /// Create a builder for the server.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Get a reference to the room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.shared.registry
    }

    /// Handle for out-of-session emits.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle::new(Arc::clone(&self.shared.registry))
    }

    /// Bind the listener without serving yet.
    pub async fn bind(self) -> SocketResult<BoundServer> {
        let listener = TcpListener::bind(self.shared.config.bind_addr).await?;
        Ok(BoundServer {
            listener,
            shared: self.shared,
        })
    }

    /// Run the server.
    pub async fn run(self) -> SocketResult<()> {
        self.bind().await?.run().await
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> SocketResult<()>
    where
        F: Future<Output = ()>,
    {
        self.bind().await?.run_until(shutdown).await
    }
}

/// A server whose listener is bound.
pub struct BoundServer {
    listener: TcpListener,
    shared: Arc<ServerShared>,
}

impl BoundServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for out-of-session emits.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle::new(Arc::clone(&self.shared.registry))
    }

    /// Serve forever.
    pub async fn run(self) -> SocketResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then close every open session.
    pub async fn run_until<F>(self, shutdown: F) -> SocketResult<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        tracing::info!(
            addr = %addr,
            path = %self.shared.config.path,
            "Socket server listening"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Socket server shutting down");
                    for id in self.shared.registry.session_ids() {
                        if let Some(session) = self.shared.registry.get_session(&id) {
                            session.close();
                        }
                    }
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(serve_connection(stream, addr, shared));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, addr: SocketAddr, shared: Arc<ServerShared>) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let shared = Arc::clone(&shared);
        async move { Ok::<_, Infallible>(admin::route(&shared, req, addr)) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        tracing::debug!(addr = %addr, error = %e, "HTTP connection error");
    }
}

/// Whether a request asks for a WebSocket upgrade.
pub(crate) fn is_websocket_upgrade<B>(req: &Request<B>) -> bool {
    let connection_upgrade = req
        .headers()
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")));
    let upgrade_websocket = req
        .headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    connection_upgrade && upgrade_websocket
}

/// Answer an upgrade request and start the session once hyper hands over the socket.
pub(crate) fn accept_upgrade(
    shared: &Arc<ServerShared>,
    req: Request<Incoming>,
    addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let Some(key) = req.headers().get(SEC_WEBSOCKET_KEY) else {
        return admin::json_response(
            StatusCode::BAD_REQUEST,
            json!({"detail": "Missing Sec-WebSocket-Key"}),
        );
    };
    let Ok(accept) = HeaderValue::from_str(&derive_accept_key(key.as_bytes())) else {
        return admin::json_response(
            StatusCode::BAD_REQUEST,
            json!({"detail": "Invalid Sec-WebSocket-Key"}),
        );
    };

    let handshake = HandshakeInfo {
        path: req.uri().path().to_string(),
        query: req.uri().query().map(str::to_string),
        headers: req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        remote_addr: Some(addr),
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let ws =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                if let Err(e) = run_session(ws, handshake, shared).await {
                    tracing::error!(addr = %addr, error = %e, "Session error");
                }
            }
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "WebSocket upgrade failed");
            }
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    response
}

/// Drive one session from handshake to teardown.
pub(crate) async fn run_session<S>(
    ws: WebSocketStream<S>,
    handshake: HandshakeInfo,
    shared: Arc<ServerShared>,
) -> SocketResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut stream) = ws.split();

    let auth = match tokio::time::timeout(shared.config.connect_timeout, next_packet(&mut stream)).await {
        Err(_) => return Err(SocketError::Timeout),
        Ok(Err(e)) => return Err(e),
        Ok(Ok(None | Some(Packet::Disconnect))) => {
            tracing::debug!("Peer left before the handshake");
            return Ok(());
        }
        Ok(Ok(Some(Packet::Connect { auth }))) => auth,
        Ok(Ok(Some(other))) => {
            return Err(SocketError::UnexpectedPacket(format!(
                "expected connect, got {}",
                other.kind()
            )));
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session::new(uuid::Uuid::new_v4().to_string(), handshake, auth.clone(), tx);
    let writer = tokio::spawn(SessionWriter::new(sink, rx).run());
    let socket = Socket::new(session.clone(), Arc::clone(&shared.registry));
    shared.registry.register_session(session.clone());

    let accepted = if shared.config.always_connect {
        session.send_packet(&Packet::ConnectAck {
            sid: session.id.clone(),
        });
        session.set_state(SessionState::Open);
        match shared.dispatcher.connect(socket.clone(), auth).await {
            Ok(()) => true,
            Err(e) => {
                tracing::info!(session_id = %session.id, error = %e, "Connect handler rejected session");
                false
            }
        }
    } else {
        match shared.dispatcher.connect(socket.clone(), auth).await {
            Ok(()) => {
                session.send_packet(&Packet::ConnectAck {
                    sid: session.id.clone(),
                });
                session.set_state(SessionState::Open);
                true
            }
            Err(e) => {
                tracing::info!(session_id = %session.id, error = %e, "Connect handler rejected session");
                session.send_packet(&Packet::ConnectError {
                    message: e.to_string(),
                });
                false
            }
        }
    };

    if !accepted {
        session.close();
        shared.registry.drop_session(&session.id);
        flush_writer(writer, shared.config.close_timeout, &session.id).await;
        session.set_state(SessionState::Closed);
        return Ok(());
    }

    session.emit(EventKind::Connected, None);

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(message) => match Packet::from_message(&message) {
                        Ok(Some(Packet::Event { event, data })) => {
                            shared.dispatcher.dispatch(&event, socket.clone(), data).await;
                        }
                        Ok(Some(Packet::Disconnect)) => {
                            tracing::debug!(session_id = %session.id, "Client disconnected");
                            break;
                        }
                        Ok(Some(other)) => {
                            tracing::debug!(session_id = %session.id, packet = other.kind(), "Ignoring unexpected packet");
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(session_id = %session.id, error = %e, "Malformed frame");
                        }
                    },
                    Err(e) => {
                        tracing::debug!(session_id = %session.id, error = %e, "Transport error");
                        break;
                    }
                }
            }
            _ = session.closed() => {
                tracing::debug!(session_id = %session.id, "Server closed session");
                break;
            }
        }
    }

    teardown(&shared, &socket, writer).await;
    Ok(())
}

/// Wait for the writer to drain, aborting it if the peer stopped reading.
async fn flush_writer(mut writer: JoinHandle<SocketResult<()>>, limit: Duration, session_id: &str) {
    if tokio::time::timeout(limit, &mut writer).await.is_err() {
        tracing::warn!(session_id = %session_id, "Writer did not drain in time, aborting");
        writer.abort();
    }
}

async fn teardown(shared: &ServerShared, socket: &Socket, writer: JoinHandle<SocketResult<()>>) {
    let session = socket.session();
    session.close();
    flush_writer(writer, shared.config.close_timeout, &session.id).await;

    if session.begin_teardown() {
        shared.dispatcher.disconnect(socket.clone()).await;
        shared.registry.drop_session(&session.id);
    }
    session.set_state(SessionState::Closed);
    tracing::debug!(session_id = %session.id, "Session closed");
}
