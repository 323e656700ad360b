//! Shared configuration for the regtest harness.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file (`--config-path`), then `REGTEST_*` environment
//! variables, then command-line flags. The resolved [`Config`] is a flat
//! value; typed accessors turn millisecond counts into [`Duration`]s and
//! derive the secondary daemon's RPC port from the primary's.

mod defaults;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_DAEMON_EXEC, DEFAULT_ECHO_OUTPUT, DEFAULT_INDEXER_EXEC, DEFAULT_INDEXER_PORT,
    DEFAULT_LOG_FILTER, DEFAULT_P2P_PORT, DEFAULT_READINESS_ATTEMPTS,
    DEFAULT_READINESS_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETAIN_DATA_DIRS,
    DEFAULT_ROUTE_PREFIX, DEFAULT_RPC_HOST, DEFAULT_RPC_PASSWORD, DEFAULT_RPC_PORT,
    DEFAULT_RPC_USER, DEFAULT_RUN_TIMEOUT_MS, DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_SYNC_ATTEMPTS,
    DEFAULT_SYNC_INTERVAL_MS, default_log_filter, default_log_filter_string, default_log_format,
    default_work_dir,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use ortho_config::{OrthoConfig, OrthoError};

/// Harness configuration resolved from every configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "REGTEST")]
pub struct Config {
    /// Blockchain daemon executable.
    #[ortho_config(default = defaults::default_daemon_exec())]
    pub daemon_exec: String,
    /// Dependent indexing service executable.
    #[ortho_config(default = defaults::default_indexer_exec())]
    pub indexer_exec: String,
    /// Host the daemons expose RPC on.
    #[ortho_config(default = defaults::default_rpc_host())]
    pub rpc_host: String,
    /// RPC port of the primary daemon.
    #[ortho_config(default = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,
    /// RPC user shared by both daemons.
    #[ortho_config(default = defaults::default_rpc_user())]
    pub rpc_user: String,
    /// RPC password shared by both daemons.
    #[ortho_config(default = defaults::default_rpc_password())]
    pub rpc_password: String,
    /// P2P port the primary daemon listens on.
    #[ortho_config(default = DEFAULT_P2P_PORT)]
    pub p2p_port: u16,
    /// HTTP port of the dependent indexing service.
    #[ortho_config(default = DEFAULT_INDEXER_PORT)]
    pub indexer_port: u16,
    /// Route prefix of the indexing service's HTTP API.
    #[ortho_config(default = defaults::default_route_prefix())]
    pub route_prefix: String,
    /// Root directory for every data directory of a run.
    #[ortho_config(default = default_work_dir())]
    pub work_dir: Utf8PathBuf,
    /// Spacing between daemon readiness probes, in milliseconds.
    #[ortho_config(default = DEFAULT_READINESS_INTERVAL_MS)]
    pub readiness_interval_ms: u64,
    /// Number of daemon readiness probes.
    #[ortho_config(default = DEFAULT_READINESS_ATTEMPTS)]
    pub readiness_attempts: u32,
    /// Spacing between dependent service status polls, in milliseconds.
    #[ortho_config(default = DEFAULT_SYNC_INTERVAL_MS)]
    pub sync_interval_ms: u64,
    /// Number of dependent service status polls.
    #[ortho_config(default = DEFAULT_SYNC_ATTEMPTS)]
    pub sync_attempts: u32,
    /// Fixed grace period after signalling processes, in milliseconds.
    #[ortho_config(default = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,
    /// Outer bound on a whole run, in milliseconds.
    #[ortho_config(default = DEFAULT_RUN_TIMEOUT_MS)]
    pub run_timeout_ms: u64,
    /// Timeout for each HTTP request, in milliseconds.
    #[ortho_config(default = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
    /// Relay child stdout and stderr into the log; on when unset.
    pub echo_output: Option<bool>,
    /// Keep data directories on disk after teardown; on when unset.
    pub retain_data_dirs: Option<bool>,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_exec: defaults::default_daemon_exec(),
            indexer_exec: defaults::default_indexer_exec(),
            rpc_host: defaults::default_rpc_host(),
            rpc_port: DEFAULT_RPC_PORT,
            rpc_user: defaults::default_rpc_user(),
            rpc_password: defaults::default_rpc_password(),
            p2p_port: DEFAULT_P2P_PORT,
            indexer_port: DEFAULT_INDEXER_PORT,
            route_prefix: defaults::default_route_prefix(),
            work_dir: default_work_dir(),
            readiness_interval_ms: DEFAULT_READINESS_INTERVAL_MS,
            readiness_attempts: DEFAULT_READINESS_ATTEMPTS,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            sync_attempts: DEFAULT_SYNC_ATTEMPTS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            echo_output: None,
            retain_data_dirs: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether child stdout and stderr are relayed into the log.
    #[must_use]
    pub const fn echo_output(&self) -> bool {
        match self.echo_output {
            Some(echo) => echo,
            None => DEFAULT_ECHO_OUTPUT,
        }
    }

    /// Whether data directories survive teardown.
    #[must_use]
    pub const fn retain_data_dirs(&self) -> bool {
        match self.retain_data_dirs {
            Some(retain) => retain,
            None => DEFAULT_RETAIN_DATA_DIRS,
        }
    }

    /// Root directory for every data directory of a run.
    #[must_use]
    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }

    /// RPC port of the primary daemon.
    #[must_use]
    pub const fn primary_rpc_port(&self) -> u16 {
        self.rpc_port
    }

    /// RPC port of the secondary daemon: the port after the primary's.
    #[must_use]
    pub const fn secondary_rpc_port(&self) -> u16 {
        self.rpc_port.saturating_add(1)
    }

    /// Spacing between daemon readiness probes.
    #[must_use]
    pub const fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    /// Spacing between dependent service status polls.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Fixed grace period granted after the termination signal.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Outer bound on a whole run.
    #[must_use]
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    /// Timeout for each HTTP request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
