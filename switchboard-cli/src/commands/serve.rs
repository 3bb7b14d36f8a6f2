//! Serve command
//!
//! Runs the socket server until Ctrl-C.

use crate::commands::init_logging;
use crate::error::CliResult;
use crate::settings::{self, ServerSettings};
use switchboard_config::Validate;
use switchboard_socket::{Dispatcher, Socket};

/// Flags that override the loaded settings.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub workers: Option<usize>,
}

impl Overrides {
    fn apply(self, settings: &mut ServerSettings) {
        if let Some(host) = self.host {
            settings.host = host;
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(path) = self.path {
            settings.path = path;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
    }
}

/// Resolve settings from every layer and validate them.
pub fn resolve(overrides: Overrides) -> CliResult<ServerSettings> {
    let mut settings: ServerSettings = settings::load(overrides.config.as_deref())?;
    overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Serve command
pub fn execute(overrides: Overrides, verbose: bool) -> CliResult<()> {
    let settings = resolve(overrides)?;
    init_logging(settings.level(), verbose)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.workers)
        .enable_all()
        .build()?;

    runtime.block_on(run(settings))
}

async fn run(settings: ServerSettings) -> CliResult<()> {
    let server = settings
        .builder()?
        .build(Dispatcher::<Socket>::with_server_defaults())
        .bind()
        .await?;

    crate::info(&format!(
        "Switchboard listening on http://{}{} ({} workers)",
        server.local_addr()?,
        settings.path,
        settings.workers
    ));

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    crate::success("Server stopped");
    Ok(())
}
