//! CLI command implementations.

pub mod client;
pub mod serve;

use crate::error::{CliError, CliResult};
use switchboard_log::{Level, LogConfig};

/// Install logging at `level`, or debug when `verbose`.
///
/// `SWITCHBOARD_LOG_FORMAT` and the other logging variables still apply.
pub fn init_logging(level: Level, verbose: bool) -> CliResult<()> {
    let base = switchboard_log::config().clone();
    let level = if verbose || base.debug {
        Level::Debug
    } else {
        level
    };
    let config: LogConfig = base.with_level(level);
    switchboard_log::init_with(&config).map_err(|e| CliError::Logging(e.to_string()))
}
