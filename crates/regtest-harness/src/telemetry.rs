//! Structured logging for harness runs.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use regtest_config::{Config, LogFormat};
use thiserror::Error;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Returned once logging is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("log filter did not parse: {0}")]
    Filter(String),
    /// Another global subscriber is already installed.
    #[error("a global subscriber is already installed: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on the first call.
///
/// Later calls return a fresh [`TelemetryHandle`] without touching the
/// global state, so every test in a binary may call this.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for a malformed `log_filter` and
/// [`TelemetryError::Subscriber`] when some other subscriber was installed
/// first.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED.get_or_try_init(|| install(config))?;
    Ok(TelemetryHandle)
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let directives = config.log_filter();
    let filter =
        EnvFilter::try_new(directives).map_err(|parse| TelemetryError::Filter(parse.to_string()))?;

    // stdout belongs to the test runner.
    let base = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_thread_names(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let installed: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(base.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(base.compact().finish()),
    };
    tracing::subscriber::set_global_default(installed).map_err(TelemetryError::Subscriber)
}
