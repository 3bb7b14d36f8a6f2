//! Server and client settings.
//!
//! Both are read from an optional config file, then `.env`, then
//! `SWITCHBOARD_*` environment variables. Command-line flags are applied on
//! top by the commands before validation.

use crate::error::{CliError, CliResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use switchboard_config::{ConfigService, ConfigValidator, Result, Validate, lenient};
use switchboard_log::Level;
use switchboard_socket::{ClientConfig, CorsOrigins, ReconnectPolicy, ServerBuilder};

/// Prefix of the environment variables read by the CLI.
pub const ENV_PREFIX: &str = "SWITCHBOARD";

const LOG_LEVELS: [&str; 7] = ["trace", "debug", "info", "warn", "warning", "error", "critical"];

/// Load the configuration layers without validating.
pub fn load<T: DeserializeOwned>(config_file: Option<&str>) -> CliResult<T> {
    let mut builder = ConfigService::builder().with_prefix(ENV_PREFIX);
    if let Some(path) = config_file {
        builder = builder.add_file_auto(path);
    }
    let service = builder.load_dotenv(None).build()?;
    Ok(service.manager().extract()?)
}

fn validate_log_level(value: &str) -> Result<()> {
    let value = value.to_lowercase();
    ConfigValidator::one_of(&value.as_str(), &LOG_LEVELS, "log_level")
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_path() -> String {
    "/socket.io".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cors() -> String {
    "*".to_string()
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Settings for `switchboard serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Interface to listen on
    #[serde(default = "default_server_host")]
    pub host: String,
    /// TCP port
    #[serde(default = "default_port", deserialize_with = "lenient::parse")]
    pub port: u16,
    /// WebSocket endpoint path
    #[serde(default = "default_path")]
    pub path: String,
    /// Minimum log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `*` or a comma-separated origin list
    #[serde(default = "default_cors")]
    pub cors_allowed_origins: String,
    /// Acknowledge sessions before the connect handler runs
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub always_connect: bool,
    /// Runtime worker threads
    #[serde(default = "default_workers", deserialize_with = "lenient::parse")]
    pub workers: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_port(),
            path: default_path(),
            log_level: default_log_level(),
            cors_allowed_origins: default_cors(),
            always_connect: true,
            workers: default_workers(),
        }
    }
}

impl Validate for ServerSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.host, "host")?;
        ConfigValidator::is_port(self.port, "port")?;
        ConfigValidator::is_path(&self.path, "path")?;
        validate_log_level(&self.log_level)?;
        ConfigValidator::not_empty(&self.cors_allowed_origins, "cors_allowed_origins")?;
        ConfigValidator::in_range(self.workers, 1, 1024, "workers")
    }
}

impl ServerSettings {
    /// Log level, defaulting to info for unknown names.
    pub fn level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::Info)
    }

    /// Resolve `host:port` to a listen address.
    pub fn bind_addr(&self) -> CliResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| CliError::InvalidArgument(format!("cannot resolve host `{}`", self.host)))
    }

    /// Server builder carrying these settings.
    pub fn builder(&self) -> CliResult<ServerBuilder> {
        Ok(ServerBuilder::new()
            .bind_addr(self.bind_addr()?)
            .path(self.path.clone())
            .cors_allowed_origins(CorsOrigins::parse(&self.cors_allowed_origins))
            .always_connect(self.always_connect))
    }
}

fn default_server_url() -> String {
    "http://0.0.0.0:1234".to_string()
}

fn default_token() -> String {
    "test".to_string()
}

fn default_delay() -> f64 {
    3.0
}

fn default_delay_max() -> f64 {
    5.0
}

fn default_attempts() -> u32 {
    10
}

/// Settings for `switchboard client`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Server base URL
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Bearer token; empty sends no credentials
    #[serde(default = "default_token")]
    pub token: String,
    /// WebSocket endpoint path
    #[serde(default = "default_path")]
    pub path: String,
    /// Minimum log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Retry failed and dropped connections
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub reconnection: bool,
    /// Seconds before the first retry
    #[serde(default = "default_delay", deserialize_with = "lenient::parse")]
    pub reconnection_delay: f64,
    /// Upper bound in seconds for the retry delay
    #[serde(default = "default_delay_max", deserialize_with = "lenient::parse")]
    pub reconnection_delay_max: f64,
    /// Total connection attempts
    #[serde(default = "default_attempts", deserialize_with = "lenient::parse")]
    pub reconnection_attempts: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            token: default_token(),
            path: default_path(),
            log_level: default_log_level(),
            reconnection: true,
            reconnection_delay: default_delay(),
            reconnection_delay_max: default_delay_max(),
            reconnection_attempts: default_attempts(),
        }
    }
}

impl Validate for ClientSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::is_url(&self.server_url, "server_url")?;
        ConfigValidator::is_path(&self.path, "path")?;
        validate_log_level(&self.log_level)?;
        ConfigValidator::non_negative(self.reconnection_delay, "reconnection_delay")?;
        ConfigValidator::non_negative(self.reconnection_delay_max, "reconnection_delay_max")?;
        ConfigValidator::in_range(self.reconnection_attempts, 1, 10_000, "reconnection_attempts")
    }
}

impl ClientSettings {
    /// Log level, defaulting to info for unknown names.
    pub fn level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::Info)
    }

    /// Retry policy described by these settings.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.reconnection,
            delay: Duration::try_from_secs_f64(self.reconnection_delay).unwrap_or_default(),
            max_delay: Duration::try_from_secs_f64(self.reconnection_delay_max).unwrap_or_default(),
            max_attempts: self.reconnection_attempts,
        }
    }

    /// Client configuration carrying these settings.
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.server_url.clone())
            .path(self.path.clone())
            .reconnect(self.reconnect_policy());
        if self.token.is_empty() {
            config
        } else {
            config.token(self.token.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::ConfigManager;
    use switchboard_socket::{Dispatcher, Socket};

    fn from_env<T: DeserializeOwned>(vars: &[(&str, &str)]) -> T {
        let manager = ConfigManager::with_prefix(ENV_PREFIX);
        manager.load_env_from(vars.iter().copied());
        manager.extract().unwrap()
    }

    #[test]
    fn test_server_defaults() {
        let settings: ServerSettings = from_env(&[]);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 1234);
        assert_eq!(settings.path, "/socket.io");
        assert_eq!(settings.cors_allowed_origins, "*");
        assert!(settings.always_connect);
        assert!(settings.workers >= 1);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.level(), Level::Info);
    }

    #[test]
    fn test_server_env_strings_are_coerced() {
        let settings: ServerSettings = from_env(&[
            ("SWITCHBOARD_HOST", "127.0.0.1"),
            ("SWITCHBOARD_PORT", "8000"),
            ("SWITCHBOARD_ALWAYS_CONNECT", "false"),
            ("SWITCHBOARD_WORKERS", "2"),
            ("SWITCHBOARD_LOG_LEVEL", "DEBUG"),
        ]);
        assert_eq!(settings.port, 8000);
        assert!(!settings.always_connect);
        assert_eq!(settings.workers, 2);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.level(), Level::Debug);
        assert_eq!(
            settings.bind_addr().unwrap(),
            "127.0.0.1:8000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_server_validation() {
        let settings = ServerSettings {
            port: 0,
            ..ServerSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = ServerSettings {
            log_level: "loud".to_string(),
            ..ServerSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = ServerSettings {
            path: "socket.io".to_string(),
            ..ServerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_server_builder_carries_settings() {
        let settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 9000,
            path: "/events".to_string(),
            cors_allowed_origins: "http://a.test".to_string(),
            always_connect: false,
            ..ServerSettings::default()
        };
        let server = settings
            .builder()
            .unwrap()
            .build(Dispatcher::<Socket>::with_server_defaults());
        let config = server.config();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.path, "/events");
        assert!(!config.always_connect);
        assert!(config.cors_allowed_origins.allows("http://a.test"));
        assert!(!config.cors_allowed_origins.allows("http://b.test"));
    }

    #[test]
    fn test_client_defaults() {
        let settings: ClientSettings = from_env(&[]);
        assert_eq!(settings, ClientSettings::default());
        assert!(settings.validate().is_ok());

        let policy = settings.reconnect_policy();
        assert!(policy.enabled);
        assert_eq!(policy.delay, Duration::from_secs(3));
        assert_eq!(policy.attempts(), 10);
    }

    #[test]
    fn test_client_config_carries_token() {
        let settings: ClientSettings = from_env(&[
            ("SWITCHBOARD_SERVER_URL", "http://localhost:1234"),
            ("SWITCHBOARD_TOKEN", "secret"),
            ("SWITCHBOARD_RECONNECTION", "0"),
            ("SWITCHBOARD_RECONNECTION_DELAY", "0.5"),
        ]);
        let config = settings.client_config();

        assert_eq!(config.server_url, "http://localhost:1234");
        assert_eq!(config.reconnect.attempts(), 1);
        assert_eq!(config.reconnect.delay, Duration::from_millis(500));
        assert!(
            config
                .headers
                .iter()
                .any(|(name, value)| name == "Authorization" && value == "Bearer secret")
        );
        assert_eq!(
            config.auth.as_ref().and_then(|auth| auth.get("token")),
            Some(&serde_json::json!("secret"))
        );
    }

    #[test]
    fn test_client_empty_token_sends_no_credentials() {
        let settings = ClientSettings {
            token: String::new(),
            ..ClientSettings::default()
        };
        let config = settings.client_config();
        assert!(config.headers.is_empty());
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_client_validation() {
        let settings = ClientSettings {
            server_url: "0.0.0.0:1234".to_string(),
            ..ClientSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = ClientSettings {
            reconnection_delay: -1.0,
            ..ClientSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
