//! Errors raised while building the regression chain.

use thiserror::Error;

use super::ChainStep;
use crate::amount::Amount;
use crate::process::Role;
use crate::rpc::RpcClientError;

/// The daemons are not peered with each other. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("the {role} daemon reports {connections} peer connections, expected 1")]
pub struct ConnectivityError {
    /// Daemon that reported the unexpected count.
    pub role: Role,
    /// Peer connections it reported.
    pub connections: u32,
}

/// A chain-building step failed; later steps are not attempted.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The two daemons are not connected to each other.
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
    /// A daemon call failed during a step.
    #[error("{step} step failed on the {role} daemon: {source}")]
    Step {
        /// Step being executed.
        step: ChainStep,
        /// Daemon that was called.
        role: Role,
        /// Call failure.
        #[source]
        source: RpcClientError,
    },
    /// `generate` returned fewer block hashes than requested.
    #[error("the {role} daemon mined {actual} of {expected} requested blocks")]
    ShortGenerate {
        /// Daemon that mined.
        role: Role,
        /// Blocks requested.
        expected: u32,
        /// Block hashes returned.
        actual: usize,
    },
    /// The recipient's wallet does not hold the amount just sent to it.
    #[error("the {role} wallet holds {balance} after receiving {expected}")]
    Unfunded {
        /// Receiving daemon.
        role: Role,
        /// Amount transferred.
        expected: Amount,
        /// Balance the wallet reported.
        balance: Amount,
    },
    /// The primary's height never matched the recorded block count.
    #[error("primary height {observed:?} never matched {target} generated blocks")]
    HeightMismatch {
        /// Blocks recorded as generated.
        target: u64,
        /// Last height observed, if any poll succeeded.
        observed: Option<u64>,
    },
    /// The address re-use scenario could not be assembled.
    #[error("address re-use scenario: {reason}")]
    Reuse {
        /// What was missing or inconsistent.
        reason: String,
    },
}

impl ChainError {
    pub(crate) fn reuse(reason: impl Into<String>) -> Self {
        Self::Reuse {
            reason: reason.into(),
        }
    }
}
