//! Built-in defaults for a local regtest network and its indexer.

use std::env;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default blockchain daemon executable, resolved through `PATH`.
pub const DEFAULT_DAEMON_EXEC: &str = "bitcoind";

/// Default dependent indexing service executable, resolved through `PATH`.
pub const DEFAULT_INDEXER_EXEC: &str = "btccored";

/// Default host the daemons bind their RPC servers to.
pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";

/// RPC port of the primary daemon. The secondary uses the next port up.
pub const DEFAULT_RPC_PORT: u16 = 58332;

/// RPC user shared by both daemons.
pub const DEFAULT_RPC_USER: &str = "local";

/// RPC password shared by both daemons.
pub const DEFAULT_RPC_PASSWORD: &str = "localtest";

/// Regtest P2P port the primary daemon listens on.
pub const DEFAULT_P2P_PORT: u16 = 18444;

/// HTTP port of the dependent indexing service.
pub const DEFAULT_INDEXER_PORT: u16 = 53001;

/// Route prefix the indexing service mounts its HTTP API under.
pub const DEFAULT_ROUTE_PREFIX: &str = "api";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Spacing between daemon readiness probes.
pub const DEFAULT_READINESS_INTERVAL_MS: u64 = 1_000;

/// Number of daemon readiness probes before giving up.
pub const DEFAULT_READINESS_ATTEMPTS: u32 = 1_000;

/// Spacing between dependent service status polls.
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 1_000;

/// Number of dependent service status polls before giving up.
pub const DEFAULT_SYNC_ATTEMPTS: u32 = 100;

/// Fixed grace period granted to processes after the termination signal.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 3_000;

/// Outer bound on a whole harness run.
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 60_000;

/// Timeout applied to every individual HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Child output is relayed unless switched off.
pub const DEFAULT_ECHO_OUTPUT: bool = true;

/// Data directories are kept for inspection unless switched off.
pub const DEFAULT_RETAIN_DATA_DIRS: bool = true;

/// Default log filter expression used by the harness.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default daemon executable as an owned string.
#[must_use]
pub fn default_daemon_exec() -> String {
    DEFAULT_DAEMON_EXEC.to_owned()
}

/// Default indexer executable as an owned string.
#[must_use]
pub fn default_indexer_exec() -> String {
    DEFAULT_INDEXER_EXEC.to_owned()
}

/// Default RPC host as an owned string.
#[must_use]
pub fn default_rpc_host() -> String {
    DEFAULT_RPC_HOST.to_owned()
}

/// Default RPC user as an owned string.
#[must_use]
pub fn default_rpc_user() -> String {
    DEFAULT_RPC_USER.to_owned()
}

/// Default RPC password as an owned string.
#[must_use]
pub fn default_rpc_password() -> String {
    DEFAULT_RPC_PASSWORD.to_owned()
}

/// Default route prefix as an owned string.
#[must_use]
pub fn default_route_prefix() -> String {
    DEFAULT_ROUTE_PREFIX.to_owned()
}

/// Computes the root directory holding every data directory of a run.
///
/// Falls back to `/tmp` when the platform temporary directory is not valid
/// UTF-8.
#[must_use]
pub fn default_work_dir() -> Utf8PathBuf {
    let mut base = Utf8PathBuf::from_path_buf(env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    base.push("regtest-harness");
    base
}
