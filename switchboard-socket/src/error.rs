//! Error types for socket sessions.

use thiserror::Error;

/// Socket error type.
#[derive(Error, Debug)]
pub enum SocketError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] tungstenite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A packet arrived that is not valid at this point of the session
    #[error("Unexpected packet: {0}")]
    UnexpectedPacket(String),

    /// The connect handler refused the session
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// An event carried a payload the handler cannot use
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// An event handler failed
    #[error("Handler error: {0}")]
    Handler(String),

    /// The transport dropped while the session was open
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Every handshake attempt allowed by the reconnect policy failed
    #[error("Gave up after {attempts} failed connection attempts")]
    ReconnectExhausted {
        /// Number of failed handshakes
        attempts: u32,
    },

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid handshake header
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}

impl SocketError {
    /// Build a handler error from any displayable cause.
    pub fn handler<E: std::fmt::Display>(cause: E) -> Self {
        Self::Handler(cause.to_string())
    }

    /// Whether this error ends the client for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReconnectExhausted { .. } | Self::ConnectionLost(_) | Self::InvalidUrl(_)
        )
    }
}

/// Result type for socket operations.
pub type SocketResult<T> = Result<T, SocketError>;

/// Result returned by event handlers.
pub type HandlerResult = Result<(), SocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_names_attempts() {
        let err = SocketError::ReconnectExhausted { attempts: 3 };
        assert_eq!(err.to_string(), "Gave up after 3 failed connection attempts");
        assert!(err.is_terminal());
    }

    #[test]
    fn test_routing_errors_are_not_terminal() {
        assert!(!SocketError::InvalidPayload("join".into()).is_terminal());
        assert!(!SocketError::handler("boom").is_terminal());
    }
}
