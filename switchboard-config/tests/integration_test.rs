//! Integration tests for switchboard-config

use serde::Deserialize;
use std::io::Write;
use switchboard_config::*;

#[derive(Debug, Deserialize)]
struct ClientFile {
    server_url: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    reconnection: bool,
    #[serde(deserialize_with = "lenient::parse")]
    reconnection_attempts: u32,
}

impl Validate for ClientFile {
    fn validate(&self) -> Result<()> {
        ConfigValidator::is_url(&self.server_url, "server_url")?;
        ConfigValidator::in_range(self.reconnection_attempts, 1, 100, "reconnection_attempts")
    }
}

fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_toml_file_then_env_override() {
    let file = write_file(
        ".toml",
        r#"
            server_url = "http://0.0.0.0:1234"
            reconnection = true
            reconnection_attempts = 10
        "#,
    );

    let service = ConfigService::builder()
        .with_prefix("SWITCHBOARD")
        .add_file_auto(file.path().to_string_lossy())
        .vars([("SWITCHBOARD_RECONNECTION_ATTEMPTS", "3")])
        .build()
        .unwrap();

    let settings: ClientFile = service.settings().unwrap();
    assert_eq!(settings.server_url, "http://0.0.0.0:1234");
    assert!(settings.reconnection);
    assert_eq!(settings.reconnection_attempts, 3);
}

#[test]
fn test_json_file_with_explicit_format() {
    let file = write_file(
        ".conf",
        r#"{"server_url": "ws://localhost:1234", "reconnection_attempts": 1}"#,
    );

    let manager = ConfigManager::new();
    manager
        .load_file(&file.path().to_string_lossy(), FileFormat::Json)
        .unwrap();

    let settings: ClientFile = manager.load_validated().unwrap();
    assert!(!settings.reconnection);
    assert_eq!(settings.reconnection_attempts, 1);
}

#[test]
fn test_env_file_values_are_coerced() {
    let file = write_file(
        ".env",
        "SERVER_URL=http://localhost:1234\nRECONNECTION=0\nRECONNECTION_ATTEMPTS=\"5\"\n",
    );

    let manager = ConfigManager::new();
    manager.load_file_auto(&file.path().to_string_lossy()).unwrap();

    let settings: ClientFile = manager.load_validated().unwrap();
    assert!(!settings.reconnection);
    assert_eq!(settings.reconnection_attempts, 5);
}

#[test]
fn test_validation_failure_names_field() {
    let manager = ConfigManager::new();
    manager.set("server_url", "localhost").unwrap();
    manager.set("reconnection_attempts", 3).unwrap();

    let err = manager.load_validated::<ClientFile>().unwrap_err();
    assert!(err.to_string().contains("server_url"));
}

#[test]
fn test_unsupported_extension() {
    let file = write_file(".yaml", "a: 1");
    let manager = ConfigManager::new();
    assert!(matches!(
        manager.load_file_auto(&file.path().to_string_lossy()),
        Err(ConfigError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_env_loader_missing_var() {
    let loader = EnvLoader::new(None);

    let result = loader.load_var("NONEXISTENT_VAR_123456");
    assert!(result.is_err());
}

#[test]
fn test_config_error_display() {
    let err = ConfigError::ParseError("test_key".to_string());
    let display = format!("{}", err);
    assert!(display.contains("test_key"));
}
