/// Tracing subscriber setup for the daemon.
use crate::errors::{DaemonError, DaemonResult};
use quill_core::LogFormat;
use tracing_subscriber::EnvFilter;

/// Pick the effective log level: `--verbose` wins, then `--log-level`,
/// then the configured level.
pub fn effective_level(verbose: bool, cli_level: Option<&str>, configured: &str) -> String {
    if verbose {
        "debug".to_string()
    } else {
        cli_level.unwrap_or(configured).to_string()
    }
}

/// Install the global subscriber. `RUST_LOG` directives still apply on top
/// of `level`.
pub fn init_logging(level: &str, format: LogFormat) -> DaemonResult<()> {
    let directive = level
        .parse()
        .map_err(|e| DaemonError::Logging(format!("invalid log level {}: {}", level, e)))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    result.map_err(|e| DaemonError::Logging(e.to_string()))
}
