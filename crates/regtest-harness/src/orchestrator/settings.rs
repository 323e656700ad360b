//! Resolved settings for one harness run.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use regtest_config::Config;

use crate::chain::BaselinePlan;
use crate::process::{DaemonLaunch, Peering, Role};
use crate::retry::RetryPolicy;
use crate::rpc::RpcEndpoint;

/// Data directory of the primary daemon, under the work directory.
pub const PRIMARY_DATA_DIR: &str = "bitcoin1";
/// Data directory of the secondary daemon, under the work directory.
pub const SECONDARY_DATA_DIR: &str = "bitcoin2";
/// Data directory of the indexing service, under the work directory.
pub const INDEXER_DATA_DIR: &str = "btccore";

/// Everything a [`Harness`](super::Harness) needs, detached from the
/// configuration layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessSettings {
    /// Daemon executable.
    pub daemon_program: String,
    /// Positional arguments placed before the daemon flags.
    pub daemon_prefix_args: Vec<String>,
    /// Indexing service executable.
    pub indexer_program: String,
    /// Indexing service arguments.
    pub indexer_args: Vec<String>,
    /// Host both daemons and the indexer are reached on.
    pub host: String,
    /// RPC port of the primary; the secondary uses the next one.
    pub rpc_port: u16,
    /// RPC user.
    pub rpc_user: String,
    /// RPC password.
    pub rpc_password: String,
    /// P2P port of the primary.
    pub p2p_port: u16,
    /// HTTP port of the indexing service.
    pub indexer_port: u16,
    /// Route prefix of the indexing service.
    pub route_prefix: String,
    /// Root of every data directory.
    pub work_dir: Utf8PathBuf,
    /// Daemon readiness and height confirmation policy.
    pub readiness: RetryPolicy,
    /// Indexer sync policy.
    pub sync: RetryPolicy,
    /// Grace period after SIGTERM.
    pub shutdown_grace: Duration,
    /// Outer bound on setup and verification.
    pub run_timeout: Duration,
    /// Per HTTP request timeout.
    pub request_timeout: Duration,
    /// Relay child output into the log.
    pub echo_output: bool,
    /// Keep data directories after teardown.
    pub retain_data_dirs: bool,
    /// Amounts and confirmations of the baseline chain.
    pub plan: BaselinePlan,
}

impl HarnessSettings {
    /// Settings resolved from a loaded [`Config`].
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            daemon_program: config.daemon_exec.clone(),
            daemon_prefix_args: Vec::new(),
            indexer_program: config.indexer_exec.clone(),
            indexer_args: vec!["start".to_owned()],
            host: config.rpc_host.clone(),
            rpc_port: config.primary_rpc_port(),
            rpc_user: config.rpc_user.clone(),
            rpc_password: config.rpc_password.clone(),
            p2p_port: config.p2p_port,
            indexer_port: config.indexer_port,
            route_prefix: config.route_prefix.clone(),
            work_dir: config.work_dir().to_owned(),
            readiness: RetryPolicy::new(config.readiness_interval(), config.readiness_attempts),
            sync: RetryPolicy::new(config.sync_interval(), config.sync_attempts),
            shutdown_grace: config.shutdown_grace(),
            run_timeout: config.run_timeout(),
            request_timeout: config.request_timeout(),
            echo_output: config.echo_output(),
            retain_data_dirs: config.retain_data_dirs(),
            plan: BaselinePlan::default(),
        }
    }

    /// Replaces the daemon command line prefix.
    #[must_use]
    pub fn with_daemon_command(
        mut self,
        program: impl Into<String>,
        prefix_args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.daemon_program = program.into();
        self.daemon_prefix_args = prefix_args.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the indexing service command line.
    #[must_use]
    pub fn with_indexer_command(
        mut self,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.indexer_program = program.into();
        self.indexer_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Moves every data directory under `work_dir`.
    #[must_use]
    pub fn with_work_dir(mut self, work_dir: impl Into<Utf8PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Replaces the primary RPC port and the indexer port.
    #[must_use]
    pub const fn with_ports(mut self, rpc_port: u16, indexer_port: u16) -> Self {
        self.rpc_port = rpc_port;
        self.indexer_port = indexer_port;
        self
    }

    /// Replaces the readiness policy.
    #[must_use]
    pub const fn with_readiness(mut self, policy: RetryPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Replaces the sync policy.
    #[must_use]
    pub const fn with_sync(mut self, policy: RetryPolicy) -> Self {
        self.sync = policy;
        self
    }

    /// Replaces the teardown grace period.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Replaces the outer run timeout.
    #[must_use]
    pub const fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Replaces the baseline plan.
    #[must_use]
    pub const fn with_plan(mut self, plan: BaselinePlan) -> Self {
        self.plan = plan;
        self
    }

    /// Sets whether data directories survive teardown.
    #[must_use]
    pub const fn with_retained_data_dirs(mut self, retain: bool) -> Self {
        self.retain_data_dirs = retain;
        self
    }

    /// RPC endpoint of the daemon in `role`.
    #[must_use]
    pub fn rpc_endpoint(&self, role: Role) -> RpcEndpoint {
        let port = match role {
            Role::Primary => self.rpc_port,
            Role::Secondary => self.rpc_port.saturating_add(1),
        };
        RpcEndpoint {
            host: self.host.clone(),
            port,
            user: self.rpc_user.clone(),
            password: self.rpc_password.clone(),
        }
    }

    /// Data directory of the daemon in `role`.
    #[must_use]
    pub fn daemon_data_dir(&self, role: Role) -> Utf8PathBuf {
        let name = match role {
            Role::Primary => PRIMARY_DATA_DIR,
            Role::Secondary => SECONDARY_DATA_DIR,
        };
        self.work_dir.join(name)
    }

    /// Data directory of the indexing service.
    #[must_use]
    pub fn indexer_data_dir(&self) -> Utf8PathBuf {
        self.work_dir.join(INDEXER_DATA_DIR)
    }

    /// Every data directory a run may create.
    #[must_use]
    pub fn data_dirs(&self) -> [Utf8PathBuf; 3] {
        [
            self.daemon_data_dir(Role::Primary),
            self.daemon_data_dir(Role::Secondary),
            self.indexer_data_dir(),
        ]
    }

    /// Launch parameters of the daemon in `role`.
    ///
    /// The primary listens on the P2P port; the secondary refuses inbound
    /// peers and connects to it.
    #[must_use]
    pub fn daemon_launch(&self, role: Role) -> DaemonLaunch {
        let peering = match role {
            Role::Primary => Peering::Listen {
                port: self.p2p_port,
            },
            Role::Secondary => Peering::Connect {
                address: format!("{}:{}", self.host, self.p2p_port),
            },
        };
        DaemonLaunch {
            role,
            program: self.daemon_program.clone(),
            prefix_args: self.daemon_prefix_args.clone(),
            data_dir: self.daemon_data_dir(role),
            rpc: self.rpc_endpoint(role),
            peering,
        }
    }

    /// Root of every data directory.
    #[must_use]
    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
