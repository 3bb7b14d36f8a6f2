//! Error types for the Switchboard CLI.

use switchboard_config::ConfigError;
use switchboard_socket::SocketError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug, Error)]
pub enum CliError {
    /// IO error (runtime setup, stdin, address resolution)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server or client failure
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// The client is not connected to the server
    #[error("Client is not connected to the server")]
    Disconnected,

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CliError::InvalidArgument("--port".to_string());
        assert_eq!(err.to_string(), "Invalid argument: --port");

        let err: CliError = ConfigError::ValidationError("port must be a valid port number".into()).into();
        assert!(err.to_string().starts_with("Configuration error:"));
        assert!(err.to_string().contains("port"));
    }
}
