//! Top-level error of a harness run.

use std::fmt;

use thiserror::Error;

use crate::chain::{ChainError, ConnectivityError};
use crate::insight::InsightError;
use crate::process::{Role, SpawnError};
use crate::rpc::RpcClientError;
use crate::sync::TimeoutError;
use crate::transport::TransportError;

/// Setup stages, in the order the orchestrator runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Launching the listening daemon.
    StartPrimary,
    /// Waiting for the primary's RPC server.
    PrimaryReady,
    /// Launching the connecting daemon.
    StartSecondary,
    /// Waiting for the secondary's RPC server and its peer connection.
    SecondaryReady,
    /// Running the baseline chain steps.
    BuildChain,
    /// Waiting for the primary to see every mined block.
    ConfirmHeight,
    /// Writing the indexer configuration and launching it.
    StartIndexer,
    /// Waiting for the indexer to reach the chain height.
    SyncIndexer,
    /// Running caller assertions.
    Verify,
    /// Running the address re-use scenario.
    AddressReuse,
}

impl Stage {
    /// Kebab-case stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StartPrimary => "start-primary",
            Self::PrimaryReady => "primary-ready",
            Self::StartSecondary => "start-secondary",
            Self::SecondaryReady => "secondary-ready",
            Self::BuildChain => "build-chain",
            Self::ConfirmHeight => "confirm-height",
            Self::StartIndexer => "start-indexer",
            Self::SyncIndexer => "sync-indexer",
            Self::Verify => "verify",
            Self::AddressReuse => "address-reuse",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category a failure originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A process or its directory could not be set up.
    Spawn,
    /// A daemon or the indexer could not be reached.
    Transport,
    /// A daemon rejected a call or answered nonsense.
    Rpc,
    /// A bounded wait ran out.
    Timeout,
    /// The daemons are not peered.
    Connectivity,
}

impl ErrorKind {
    /// Lower-case kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Transport => "transport",
            Self::Rpc => "rpc",
            Self::Timeout => "timeout",
            Self::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a harness run. Teardown has run (or will run on drop) by
/// the time a caller sees one.
#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    /// A process could not be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// An HTTP client could not be built.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A daemon never started serving RPC.
    #[error("the {role} daemon was not ready after {attempts} probes: {source}")]
    Readiness {
        /// Daemon being waited for.
        role: Role,
        /// Probes made.
        attempts: u32,
        /// Last probe failure.
        #[source]
        source: RpcClientError,
    },
    /// Chain building or the re-use scenario failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The indexer never caught up.
    #[error(transparent)]
    Sync(#[from] TimeoutError),
    /// The outer run timeout fired before a stage began.
    #[error("run timeout of {limit_ms} ms exceeded before the {stage} stage")]
    DeadlineExceeded {
        /// Stage that was about to run.
        stage: Stage,
        /// Configured limit.
        limit_ms: u64,
    },
    /// Querying the indexer failed.
    #[error(transparent)]
    Insight(#[from] InsightError),
    /// A component was used before setup created it.
    #[error("{component} is not running")]
    NotStarted {
        /// Missing component.
        component: &'static str,
    },
}

impl HarnessError {
    /// The category the failure originates from.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn(_) | Self::NotStarted { .. } => ErrorKind::Spawn,
            Self::Transport(_) | Self::Insight(_) => ErrorKind::Transport,
            Self::Readiness { source, .. } => rpc_kind(source),
            Self::Chain(error) => chain_kind(error),
            Self::Sync(_) | Self::DeadlineExceeded { .. } => ErrorKind::Timeout,
        }
    }
}

impl From<ConnectivityError> for HarnessError {
    fn from(error: ConnectivityError) -> Self {
        Self::Chain(error.into())
    }
}

const fn rpc_kind(error: &RpcClientError) -> ErrorKind {
    match error {
        RpcClientError::Transport(_) => ErrorKind::Transport,
        RpcClientError::Rpc(_) | RpcClientError::Codec { .. } => ErrorKind::Rpc,
    }
}

const fn chain_kind(error: &ChainError) -> ErrorKind {
    match error {
        ChainError::Connectivity(_) => ErrorKind::Connectivity,
        ChainError::Step { source, .. } => rpc_kind(source),
        ChainError::HeightMismatch { .. } => ErrorKind::Timeout,
        ChainError::ShortGenerate { .. }
        | ChainError::Unfunded { .. }
        | ChainError::Reuse { .. } => ErrorKind::Rpc,
    }
}
