//! Command-line tests for the switchboard binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::time::Duration;

fn switchboard() -> Command {
    let mut cmd = Command::cargo_bin("switchboard").unwrap();
    cmd.env_remove("SWITCHBOARD_CONFIG")
        .env_remove("RUST_LOG")
        .timeout(Duration::from_secs(20));
    cmd
}

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn test_help_lists_commands() {
    switchboard()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("client"));
}

#[test]
fn test_serve_rejects_invalid_port_from_config() {
    let file = config_file("host = \"127.0.0.1\"\nport = 0\n");

    switchboard()
        .args(["serve", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("port must be a valid port number"));
}

#[test]
fn test_serve_rejects_unknown_log_level_from_env() {
    switchboard()
        .arg("serve")
        .env("SWITCHBOARD_LOG_LEVEL", "loud")
        .assert()
        .failure()
        .stderr(predicate::str::contains("log_level"));
}

#[test]
fn test_serve_missing_config_file() {
    switchboard()
        .args(["serve", "--config", "/nonexistent/switchboard.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_client_rejects_invalid_url() {
    switchboard()
        .args(["client", "--url", "localhost:1234"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("server_url"));
}

#[test]
fn test_client_exits_when_server_unreachable() {
    let url = format!("http://127.0.0.1:{}", free_port());

    switchboard()
        .args(["client", "--no-reconnect", "--url", &url])
        .write_stdin("hello\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Client is not connected to the server"));
}
