//! # Switchboard Socket
//!
//! Room-multiplexed real-time event sessions over WebSocket, built on
//! tokio-tungstenite.
//!
//! ## Features
//!
//! - Socket server with per-session read and writer tasks
//! - Room registry with atomic join/leave and snapshot broadcasts
//! - Event dispatcher shared by server and client
//! - Reconnecting client driven by a background task
//! - Administrative HTTP routes on the same listener
//!
//! ## Example
//!
//! ```rust,no_run
//! use switchboard_socket::{Dispatcher, Socket, SocketServer};
//!
//! # async fn run() -> switchboard_socket::SocketResult<()> {
//! let mut dispatcher = Dispatcher::<Socket>::with_server_defaults();
//! dispatcher
//!     .on("typing", |socket: Socket, data| async move {
//!         for room in socket.rooms() {
//!             socket.registry().broadcast(&room, "typing", data.clone());
//!         }
//!         Ok(())
//!     })
//!     .expect("custom event");
//!
//! SocketServer::builder()
//!     .bind("0.0.0.0:1234")?
//!     .build(dispatcher)
//!     .run()
//!     .await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod admin;
mod client;
mod dispatcher;
mod error;
mod event;
mod packet;
mod room;
mod server;
mod session;
mod socket;

pub use client::{ClientConfig, ClientContext, ClientHandle, ClientState, ReconnectPolicy, SocketClient};
pub use dispatcher::{
    ConnectHandler, DispatchError, Dispatcher, DisconnectHandler, EventHandler, HandlerContext,
};
pub use error::{HandlerResult, SocketError, SocketResult};
pub use event::{AuthPayload, EventKind};
pub use packet::Packet;
pub use room::{Room, RoomId, RoomRegistry, Target};
pub use server::{
    BoundServer, CorsOrigins, ServerBuilder, ServerConfig, ServerHandle, SocketServer,
};
pub use session::{HandshakeInfo, Session, SessionId, SessionState};
pub use socket::Socket;

// Re-export the raw frame type from tungstenite
pub use tungstenite::Message as RawMessage;
