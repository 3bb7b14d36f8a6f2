//! Client command
//!
//! Connects to a server and sends every stdin line as a `message` event.
//! `exit` or Ctrl-C closes the session.

use crate::commands::init_logging;
use crate::error::{CliError, CliResult};
use crate::settings::{self, ClientSettings};
use serde_json::Value;
use std::io::Write;
use std::time::Duration;
use switchboard_config::Validate;
use switchboard_socket::{ClientHandle, EventKind, SocketClient};
use tokio::io::{AsyncBufReadExt, BufReader};

const PROMPT: &str = "Enter a message (or \"exit\" to quit): ";

/// Grace period for the first handshake before reading input.
const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// Flags that override the loaded settings.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<String>,
    pub url: Option<String>,
    pub token: Option<String>,
    pub path: Option<String>,
    pub attempts: Option<u32>,
    pub delay: Option<f64>,
    pub no_reconnect: bool,
}

impl Overrides {
    fn apply(self, settings: &mut ClientSettings) {
        if let Some(url) = self.url {
            settings.server_url = url;
        }
        if let Some(token) = self.token {
            settings.token = token;
        }
        if let Some(path) = self.path {
            settings.path = path;
        }
        if let Some(attempts) = self.attempts {
            settings.reconnection_attempts = attempts;
        }
        if let Some(delay) = self.delay {
            settings.reconnection_delay = delay;
        }
        if self.no_reconnect {
            settings.reconnection = false;
        }
    }
}

/// Resolve settings from every layer and validate them.
pub fn resolve(overrides: Overrides) -> CliResult<ClientSettings> {
    let mut settings: ClientSettings = settings::load(overrides.config.as_deref())?;
    overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Client command
pub fn execute(overrides: Overrides, verbose: bool) -> CliResult<()> {
    let settings = resolve(overrides)?;
    init_logging(settings.level(), verbose)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run(settings));
    // a pending stdin read would otherwise hold shutdown
    runtime.shutdown_background();
    result
}

enum Input {
    Line(String),
    Quit,
    Closed,
}

fn is_exit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("exit")
}

fn prompt() -> CliResult<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", PROMPT)?;
    stdout.flush()?;
    Ok(())
}

async fn run(settings: ClientSettings) -> CliResult<()> {
    tracing::info!(url = %settings.server_url, path = %settings.path, "Connecting");
    let handle = SocketClient::new(settings.client_config()).spawn();
    tokio::time::sleep(STARTUP_GRACE).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !handle.is_connected() {
            stop(&handle).await;
            return Err(CliError::Disconnected);
        }

        prompt()?;
        let input = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if is_exit(&line) => Input::Quit,
                Some(line) => Input::Line(line),
                None => Input::Quit,
            },
            _ = tokio::signal::ctrl_c() => Input::Quit,
            _ = handle.closed() => Input::Closed,
        };

        match input {
            Input::Line(line) => {
                handle.emit(EventKind::Message, Some(Value::String(line)));
            }
            Input::Quit => break,
            Input::Closed => println!(),
        }
    }

    stop(&handle).await;
    Ok(())
}

async fn stop(handle: &ClientHandle) {
    handle.disconnect();
    if let Err(e) = handle.wait().await {
        tracing::warn!(error = %e, "Client stopped with an error");
    }
}
