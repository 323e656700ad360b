//! The setup, verify and teardown lifecycle of one regression run.
//!
//! [`Harness`] owns every piece of mutable run state in a [`HarnessState`]:
//! the supervised processes, one RPC client per daemon, the chain built on
//! them and the indexer client. Setup walks the [`Stage`]s strictly in
//! order, checking the outer run deadline before each one. Teardown runs on
//! every exit path: explicitly, at the end of [`Harness::run`], or from
//! `Drop` when assertion code panics.

mod settings;


use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use tracing::{debug, error, info, warn};

use crate::chain::{AddressReuse, ChainBuilder, ChainState, ConnectivityError, ReuseOutcome};
use crate::error::{HarnessError, Stage};
use crate::insight::{InsightClient, IndexerNodeConfig};
use crate::process::{
    DaemonInstance, ProcessHandle, ProcessSpec, ProcessSupervisor, Role, discard_data_dir,
};
use crate::retry::{Deadline, Probe, RetryError, RetryPolicy};
use crate::rpc::{DaemonCalls, NodeInfo, RpcClient, RpcClientError};
use crate::sync::wait_for_height;

pub use settings::{HarnessSettings, INDEXER_DATA_DIR, PRIMARY_DATA_DIR, SECONDARY_DATA_DIR};

/// Log target for lifecycle events.
pub(crate) const HARNESS_TARGET: &str = "regtest_harness::orchestrator";

/// A running daemon and the client bound to it.
#[derive(Debug)]
struct Daemon {
    instance: DaemonInstance,
    client: RpcClient,
}

/// The running indexing service.
#[derive(Debug)]
struct IndexerProcess {
    handle: ProcessHandle,
    data_dir: Utf8PathBuf,
    client: InsightClient,
}

/// Everything a run mutates, owned in one place.
#[derive(Debug)]
pub struct HarnessState {
    supervisor: ProcessSupervisor,
    daemons: BTreeMap<Role, Daemon>,
    chain: ChainState,
    indexer: Option<IndexerProcess>,
}

impl HarnessState {
    fn new(settings: &HarnessSettings) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(settings.shutdown_grace, settings.echo_output),
            daemons: BTreeMap::new(),
            chain: ChainState::default(),
            indexer: None,
        }
    }
}

/// Orchestrates two daemons, the chain built on them and the indexing
/// service observing them.
#[derive(Debug)]
pub struct Harness {
    settings: HarnessSettings,
    state: HarnessState,
    deadline: Deadline,
    torn_down: bool,
}

#[derive(Debug)]
enum ReadinessProbe {
    Unreachable(RpcClientError),
    Unpeered(u32),
}

impl Harness {
    /// A harness that has not started anything yet. The run deadline starts
    /// now.
    #[must_use]
    pub fn new(settings: HarnessSettings) -> Self {
        let state = HarnessState::new(&settings);
        let deadline = Deadline::starting_now(settings.run_timeout);
        Self {
            settings,
            state,
            deadline,
            torn_down: false,
        }
    }

    /// Runs setup, then `verify` if setup succeeded, then teardown.
    ///
    /// Teardown happens on every path, including a panic inside `verify`.
    ///
    /// # Errors
    ///
    /// Returns the setup failure converted into `E`, or whatever `verify`
    /// returns.
    pub fn run<T, E>(
        settings: HarnessSettings,
        verify: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<HarnessError>,
    {
        let mut harness = Self::new(settings);
        let ready = harness
            .setup()
            .and_then(|()| harness.checkpoint(Stage::Verify));
        let outcome = match ready {
            Ok(()) => verify(&mut harness),
            Err(error) => Err(error.into()),
        };
        harness.teardown();
        outcome
    }

    /// Starts both daemons, builds the baseline chain, starts the indexer
    /// and waits for it to catch up.
    ///
    /// Stops at the first failure. Whatever was started stays tracked for
    /// [`teardown`](Self::teardown).
    ///
    /// # Errors
    ///
    /// Returns the first stage's [`HarnessError`].
    pub fn setup(&mut self) -> Result<(), HarnessError> {
        let result = self.run_setup();
        match &result {
            Ok(()) => info!(
                target: HARNESS_TARGET,
                blocks_generated = self.state.chain.blocks_generated(),
                "setup complete"
            ),
            Err(failure) => error!(
                target: HARNESS_TARGET,
                kind = %failure.kind(),
                error = %failure,
                "setup failed"
            ),
        }
        result
    }

    fn run_setup(&mut self) -> Result<(), HarnessError> {
        self.start_daemon(Role::Primary)?;
        self.start_daemon(Role::Secondary)?;
        self.build_chain()?;
        self.start_indexer()?;
        self.await_sync().map(drop)
    }

    fn start_daemon(&mut self, role: Role) -> Result<(), HarnessError> {
        let (start, ready) = match role {
            Role::Primary => (Stage::StartPrimary, Stage::PrimaryReady),
            Role::Secondary => (Stage::StartSecondary, Stage::SecondaryReady),
        };
        self.checkpoint(start)?;
        let launch = self.settings.daemon_launch(role);
        let instance = self.state.supervisor.spawn_daemon(&launch)?;
        let client = RpcClient::new(instance.rpc.clone(), self.settings.request_timeout)?;
        self.state.daemons.insert(role, Daemon { instance, client });

        self.checkpoint(ready)?;
        let policy = self.settings.readiness.within(self.deadline.remaining());
        let info = await_ready(self.daemon(role)?, role, &policy)?;
        info!(
            target: HARNESS_TARGET,
            %role,
            version = info.version,
            connections = info.connections,
            "daemon ready"
        );
        Ok(())
    }

    fn build_chain(&mut self) -> Result<(), HarnessError> {
        self.checkpoint(Stage::BuildChain)?;
        let builder = ChainBuilder::new(self.primary()?, self.secondary()?)
            .with_plan(self.settings.plan);
        let chain = builder.build()?;

        self.checkpoint(Stage::ConfirmHeight)?;
        let policy = self.settings.readiness.within(self.deadline.remaining());
        let height = builder.confirm_height(&chain, &policy)?;
        debug!(target: HARNESS_TARGET, height, "primary confirmed chain height");
        self.state.chain = chain;
        Ok(())
    }

    fn start_indexer(&mut self) -> Result<(), HarnessError> {
        self.checkpoint(Stage::StartIndexer)?;
        let data_dir = self.settings.indexer_data_dir();
        self.state.supervisor.prepare_dir(&data_dir)?;
        let config_path = IndexerNodeConfig::regtest(
            self.settings.indexer_port,
            &data_dir,
            self.settings.p2p_port,
            &self.settings.route_prefix,
        )
        .write()?;
        debug!(target: HARNESS_TARGET, path = %config_path, "wrote indexer configuration");

        let spec = ProcessSpec::new("indexer", self.settings.indexer_program.clone())
            .args(self.settings.indexer_args.iter().cloned())
            .working_dir(data_dir.clone());
        let handle = self.state.supervisor.spawn(&spec)?;
        let client = InsightClient::new(
            &self.settings.host,
            self.settings.indexer_port,
            &self.settings.route_prefix,
            self.settings.request_timeout,
        )?;
        self.state.indexer = Some(IndexerProcess {
            handle,
            data_dir,
            client,
        });
        Ok(())
    }

    fn await_sync(&self) -> Result<u64, HarnessError> {
        self.checkpoint(Stage::SyncIndexer)?;
        let target = self.state.chain.blocks_generated();
        let policy = self.settings.sync.within(self.deadline.remaining());
        Ok(wait_for_height(self.indexer()?, target, &policy)?)
    }

    fn checkpoint(&self, stage: Stage) -> Result<(), HarnessError> {
        if self.deadline.is_expired() {
            return Err(HarnessError::DeadlineExceeded {
                stage,
                limit_ms: u64::try_from(self.deadline.limit().as_millis()).unwrap_or(u64::MAX),
            });
        }
        debug!(
            target: HARNESS_TARGET,
            %stage,
            remaining_ms = u64::try_from(self.deadline.remaining().as_millis()).unwrap_or(u64::MAX),
            "entering stage"
        );
        Ok(())
    }

    /// Runs the address re-use scenario on the built chain, confirms the
    /// primary saw both blocks and waits for the indexer again.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NotStarted`] before setup or after teardown,
    /// and the scenario's or the sync wait's failure otherwise.
    pub fn run_address_reuse(&mut self) -> Result<ReuseOutcome, HarnessError> {
        self.checkpoint(Stage::AddressReuse)?;
        let HarnessState { daemons, chain, .. } = &mut self.state;
        let primary = &client_of(daemons, Role::Primary)?.client;
        let secondary = &client_of(daemons, Role::Secondary)?.client;
        let outcome = AddressReuse::new(primary, secondary).run(chain)?;
        let policy = self.settings.readiness.within(self.deadline.remaining());
        ChainBuilder::new(primary, secondary).confirm_height(chain, &policy)?;
        info!(
            target: HARNESS_TARGET,
            address = %outcome.address,
            blocks_generated = chain.blocks_generated(),
            "address re-use transactions confirmed"
        );
        self.await_sync()?;
        Ok(outcome)
    }

    /// Stops every process and, unless retained, removes the data
    /// directories. Safe to call more than once; never fails.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!(
            target: HARNESS_TARGET,
            processes = self.state.supervisor.tracked_count(),
            "tearing down"
        );
        self.state.supervisor.terminate_all();
        self.state.daemons.clear();
        if let Some(indexer) = self.state.indexer.take() {
            debug!(
                target: HARNESS_TARGET,
                process = indexer.handle.name(),
                data_dir = %indexer.data_dir,
                "indexer stopped"
            );
        }
        if self.settings.retain_data_dirs {
            debug!(target: HARNESS_TARGET, work_dir = %self.settings.work_dir, "data directories retained");
        } else {
            for dir in self.settings.data_dirs() {
                discard_data_dir(&dir);
            }
        }
    }

    /// Chain state built during setup.
    #[must_use]
    pub const fn chain(&self) -> &ChainState {
        &self.state.chain
    }

    /// Address recorded for `role` while building the chain.
    #[must_use]
    pub fn address(&self, role: Role) -> Option<&str> {
        self.state.chain.address(role)
    }

    /// RPC client of the daemon in `role`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NotStarted`] when that daemon is not running.
    pub fn daemon(&self, role: Role) -> Result<&RpcClient, HarnessError> {
        client_of(&self.state.daemons, role).map(|daemon| &daemon.client)
    }

    /// RPC client of the primary daemon.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NotStarted`] when it is not running.
    pub fn primary(&self) -> Result<&RpcClient, HarnessError> {
        self.daemon(Role::Primary)
    }

    /// RPC client of the secondary daemon.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NotStarted`] when it is not running.
    pub fn secondary(&self) -> Result<&RpcClient, HarnessError> {
        self.daemon(Role::Secondary)
    }

    /// The running daemon in `role`, if any.
    #[must_use]
    pub fn instance(&self, role: Role) -> Option<&DaemonInstance> {
        self.state.daemons.get(&role).map(|daemon| &daemon.instance)
    }

    /// Client of the indexing service.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NotStarted`] when it is not running.
    pub fn indexer(&self) -> Result<&InsightClient, HarnessError> {
        self.state
            .indexer
            .as_ref()
            .map(|indexer| &indexer.client)
            .ok_or(HarnessError::NotStarted {
                component: "indexer",
            })
    }

    /// Settings of this run.
    #[must_use]
    pub const fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Number of started processes that have not exited.
    pub fn running_processes(&mut self) -> usize {
        self.state.supervisor.running_count()
    }

    /// Process ids of every process still tracked.
    #[must_use]
    pub fn pids(&self) -> Vec<u32> {
        self.state.supervisor.pids()
    }

    /// Whether teardown has run.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if !self.torn_down {
            warn!(target: HARNESS_TARGET, "harness dropped before teardown");
        }
        self.teardown();
    }
}

fn client_of(daemons: &BTreeMap<Role, Daemon>, role: Role) -> Result<&Daemon, HarnessError> {
    daemons.get(&role).ok_or(HarnessError::NotStarted {
        component: match role {
            Role::Primary => "primary daemon",
            Role::Secondary => "secondary daemon",
        },
    })
}

/// Probes `getinfo` until the daemon answers. The secondary must also report
/// a peer, which its `connect` flag establishes once the primary listens.
fn await_ready(
    client: &RpcClient,
    role: Role,
    policy: &RetryPolicy,
) -> Result<NodeInfo, HarnessError> {
    let mut attempts = 0;
    let outcome = policy.poll(|attempt| {
        attempts = attempt;
        match client.get_info() {
            Ok(info) if role == Role::Secondary && info.connections == 0 => {
                debug!(target: HARNESS_TARGET, %role, attempt, "waiting for peer connection");
                Probe::Retry(ReadinessProbe::Unpeered(info.connections))
            }
            Ok(info) => Probe::Ready(info),
            Err(failure) if failure.is_retryable() => {
                debug!(target: HARNESS_TARGET, %role, attempt, error = %failure, "daemon not ready");
                Probe::Retry(ReadinessProbe::Unreachable(failure))
            }
            Err(failure) => Probe::Fail(ReadinessProbe::Unreachable(failure)),
        }
    });
    outcome.map_err(|failure| {
        let last = match failure {
            RetryError::Exhausted { last, .. } | RetryError::Fatal(last) => last,
        };
        match last {
            ReadinessProbe::Unpeered(connections) => {
                ConnectivityError { role, connections }.into()
            }
            ReadinessProbe::Unreachable(source) => HarnessError::Readiness {
                role,
                attempts,
                source,
            },
        }
    })
}
