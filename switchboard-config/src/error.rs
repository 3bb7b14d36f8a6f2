// Error types for configuration management

use thiserror::Error;

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No value under the key
    #[error("Configuration key not found: {0}")]
    KeyNotFound(String),

    /// A source could not be read
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// The file format cannot be told from the path
    #[error("Unsupported configuration file: {0}")]
    UnsupportedFormat(String),

    /// A source could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A value was loaded but is not acceptable
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A value could not be stored
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A value could not be read back as the requested type
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Environment lookup failed
    #[error("Environment variable error: {0}")]
    EnvError(#[from] std::env::VarError),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
