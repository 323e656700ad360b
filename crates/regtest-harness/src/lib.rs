//! Regression harness for a blockchain indexing service.
//!
//! The harness launches two regtest daemons, builds a small deterministic
//! chain across them, starts the indexing service under test and waits until
//! it has caught up. Assertion code then queries the service's HTTP API and
//! compares what it reports against the chain the harness built.
//!
//! # Components
//!
//! - [`process`]: launches and terminates the daemon and indexer processes.
//! - [`rpc`]: a JSON-RPC client bound to one daemon.
//! - [`chain`]: the ordered chain-building steps and the address re-use
//!   scenario.
//! - [`sync`]: bounded polling until the indexer reaches a height.
//! - [`insight`]: typed client for the indexer's HTTP API.
//! - [`orchestrator`]: the setup, verify and teardown lifecycle.
//!
//! Every wait is bounded by a [`RetryPolicy`] and the whole run by the
//! configured run timeout. Teardown runs on every exit path.

pub mod amount;
pub mod chain;
mod error;
pub mod insight;
pub mod orchestrator;
pub mod process;
pub mod retry;
pub mod rpc;
pub mod sync;
pub mod telemetry;
mod transport;

#[cfg(test)]
mod tests;

use std::process::Command;

pub use amount::{Amount, AmountError};
pub use chain::{ChainBuilder, ChainError, ChainState, ChainStep, ConnectivityError};
pub use error::{ErrorKind, HarnessError, Stage};
pub use insight::{InsightClient, InsightError};
pub use orchestrator::{Harness, HarnessSettings, HarnessState};
pub use process::{ProcessSupervisor, Role, SpawnError};
pub use retry::{Deadline, RetryPolicy};
pub use rpc::{DaemonCalls, DaemonRpc, RpcClient, RpcClientError, RpcError};
pub use sync::{TimeoutError, wait_for_height};
pub use transport::TransportError;

/// Whether `cmd` resolves on `PATH`.
#[must_use]
pub fn command_available(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .output()
        .is_ok_and(|out| out.status.success())
}
