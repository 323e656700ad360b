//! Deterministic chain building across the two daemons.
//!
//! [`ChainBuilder`] walks the [`ChainStep`] sequence strictly in order; each
//! step consumes what earlier steps produced and records its effects in the
//! [`ChainState`]. The first failure stops the walk.

mod error;
mod reuse;


use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::amount::Amount;
use crate::process::Role;
use crate::retry::{Probe, RetryError, RetryPolicy};
use crate::rpc::{DaemonCalls, DaemonRpc, RpcClientError};

pub use error::{ChainError, ConnectivityError};
pub use reuse::{AddressReuse, ReuseOutcome};

/// Log target for chain building.
pub(crate) const CHAIN_TARGET: &str = "regtest_harness::chain";

/// Named stages of the baseline chain, in execution order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainStep {
    /// Nothing done yet.
    #[default]
    Init,
    /// Both daemons confirmed peered.
    Connected,
    /// Maturity blocks mined on the primary.
    BlocksMined,
    /// First transfer sent to the secondary and confirmed.
    Funded,
    /// Second transfer sent back to the primary and confirmed.
    Rebalanced,
    /// Baseline complete.
    Done,
}

impl ChainStep {
    /// The step that follows this one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Connected),
            Self::Connected => Some(Self::BlocksMined),
            Self::BlocksMined => Some(Self::Funded),
            Self::Funded => Some(Self::Rebalanced),
            Self::Rebalanced => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Lower-case step name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connected => "connected",
            Self::BlocksMined => "blocks-mined",
            Self::Funded => "funded",
            Self::Rebalanced => "rebalanced",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ChainStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the chain-building steps have produced.
///
/// The block counter only grows; it is the height the indexing service must
/// reach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainState {
    step: ChainStep,
    blocks_generated: u64,
    address_book: BTreeMap<Role, String>,
    pending_txid: Option<String>,
    txids: Vec<String>,
}

impl ChainState {
    /// Last completed step.
    #[must_use]
    pub const fn step(&self) -> ChainStep {
        self.step
    }

    /// Sum of every `generate` issued so far.
    #[must_use]
    pub const fn blocks_generated(&self) -> u64 {
        self.blocks_generated
    }

    /// Receiving address fetched from the daemon in `role`.
    #[must_use]
    pub fn address(&self, role: Role) -> Option<&str> {
        self.address_book.get(&role).map(String::as_str)
    }

    /// Most recent transaction id.
    #[must_use]
    pub fn pending_txid(&self) -> Option<&str> {
        self.pending_txid.as_deref()
    }

    /// Every transaction id, oldest first.
    #[must_use]
    pub fn txids(&self) -> &[String] {
        &self.txids
    }

    pub(crate) fn record_blocks(&mut self, count: u32) {
        self.blocks_generated = self.blocks_generated.saturating_add(u64::from(count));
    }

    pub(crate) fn record_address(&mut self, role: Role, address: String) {
        self.address_book.insert(role, address);
    }

    pub(crate) fn record_txid(&mut self, txid: String) {
        self.pending_txid = Some(txid.clone());
        self.txids.push(txid);
    }

    const fn advance(&mut self, step: ChainStep) {
        self.step = step;
    }
}

/// Fixed amounts and confirmation counts of the baseline chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaselinePlan {
    /// Blocks mined on the primary so its coinbase outputs mature.
    pub maturity_blocks: u32,
    /// Amount the primary sends to the secondary.
    pub first_transfer: Amount,
    /// Blocks the primary mines on top of the first transfer.
    pub first_confirmations: u32,
    /// Amount the secondary sends back to the primary.
    pub second_transfer: Amount,
    /// Blocks the secondary mines on top of the second transfer.
    pub second_confirmations: u32,
}

impl Default for BaselinePlan {
    fn default() -> Self {
        Self {
            maturity_blocks: 101,
            first_transfer: Amount::from_coins(25),
            first_confirmations: 7,
            second_transfer: Amount::from_coins(20),
            second_confirmations: 6,
        }
    }
}

impl BaselinePlan {
    /// Blocks the whole plan mines.
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        [
            self.maturity_blocks,
            self.first_confirmations,
            self.second_confirmations,
        ]
        .into_iter()
        .map(u64::from)
        .sum()
    }
}

/// Drives the baseline chain over a primary and a secondary daemon.
pub struct ChainBuilder<'a> {
    primary: &'a dyn DaemonRpc,
    secondary: &'a dyn DaemonRpc,
    plan: BaselinePlan,
}

impl<'a> ChainBuilder<'a> {
    /// A builder running the default plan.
    #[must_use]
    pub fn new(primary: &'a dyn DaemonRpc, secondary: &'a dyn DaemonRpc) -> Self {
        Self {
            primary,
            secondary,
            plan: BaselinePlan::default(),
        }
    }

    /// Replaces the plan.
    #[must_use]
    pub const fn with_plan(mut self, plan: BaselinePlan) -> Self {
        self.plan = plan;
        self
    }

    /// Runs every step from `Init` to `Done`.
    ///
    /// # Errors
    ///
    /// Returns the first step's failure; no later step runs.
    pub fn build(&self) -> Result<ChainState, ChainError> {
        let mut state = ChainState::default();
        while let Some(step) = state.step().next() {
            self.run_step(step, &mut state)?;
            state.advance(step);
            info!(
                target: CHAIN_TARGET,
                %step,
                blocks_generated = state.blocks_generated(),
                "chain step complete"
            );
        }
        Ok(state)
    }

    fn run_step(&self, step: ChainStep, state: &mut ChainState) -> Result<(), ChainError> {
        let plan = self.plan;
        match step {
            ChainStep::Init | ChainStep::Done => Ok(()),
            ChainStep::Connected => self.verify_connectivity(),
            ChainStep::BlocksMined => {
                self.mine(step, Role::Primary, plan.maturity_blocks, state)
            }
            ChainStep::Funded => {
                self.transfer(
                    step,
                    Transfer {
                        from: Role::Primary,
                        to: Role::Secondary,
                        amount: plan.first_transfer,
                        confirmations: plan.first_confirmations,
                    },
                    state,
                )?;
                self.expect_balance(step, Role::Secondary, plan.first_transfer)
            }
            ChainStep::Rebalanced => self.transfer(
                step,
                Transfer {
                    from: Role::Secondary,
                    to: Role::Primary,
                    amount: plan.second_transfer,
                    confirmations: plan.second_confirmations,
                },
                state,
            ),
        }
    }

    fn daemon(&self, role: Role) -> &'a dyn DaemonRpc {
        match role {
            Role::Primary => self.primary,
            Role::Secondary => self.secondary,
        }
    }

    fn verify_connectivity(&self) -> Result<(), ChainError> {
        for role in [Role::Primary, Role::Secondary] {
            let info = self
                .daemon(role)
                .get_info()
                .map_err(step_failure(ChainStep::Connected, role))?;
            if info.connections != 1 {
                return Err(ConnectivityError {
                    role,
                    connections: info.connections,
                }
                .into());
            }
        }
        Ok(())
    }

    fn mine(
        &self,
        step: ChainStep,
        role: Role,
        count: u32,
        state: &mut ChainState,
    ) -> Result<(), ChainError> {
        mine_on(self.daemon(role), step, role, count, state)
    }

    fn transfer(
        &self,
        step: ChainStep,
        transfer: Transfer,
        state: &mut ChainState,
    ) -> Result<(), ChainError> {
        let recipient = self
            .daemon(transfer.to)
            .get_new_address()
            .map_err(step_failure(step, transfer.to))?;
        state.record_address(transfer.to, recipient.clone());

        let txid = self
            .daemon(transfer.from)
            .send_to_address(&recipient, transfer.amount)
            .map_err(step_failure(step, transfer.from))?;
        debug!(
            target: CHAIN_TARGET,
            %step,
            from = %transfer.from,
            %recipient,
            amount = %transfer.amount,
            %txid,
            "transfer sent"
        );
        state.record_txid(txid);

        self.mine(step, transfer.from, transfer.confirmations, state)
    }

    /// Checks the `role` wallet holds at least `expected`.
    fn expect_balance(
        &self,
        step: ChainStep,
        role: Role,
        expected: Amount,
    ) -> Result<(), ChainError> {
        let balance = self
            .daemon(role)
            .get_balance()
            .map_err(step_failure(step, role))?;
        info!(target: CHAIN_TARGET, %step, %role, %balance, "wallet balance");
        if balance < expected {
            return Err(ChainError::Unfunded {
                role,
                expected,
                balance,
            });
        }
        Ok(())
    }

    /// Polls the primary until its height equals the recorded block count.
    ///
    /// Blocks mined on the secondary reach the primary asynchronously.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::HeightMismatch`] when the height overshoots or
    /// never arrives, and [`ChainError::Step`] for non-retryable failures.
    pub fn confirm_height(&self, state: &ChainState, policy: &RetryPolicy) -> Result<u64, ChainError> {
        confirm_height(self.primary, state.blocks_generated(), policy)
    }
}

#[derive(Debug, Clone, Copy)]
struct Transfer {
    from: Role,
    to: Role,
    amount: Amount,
    confirmations: u32,
}

#[derive(Debug)]
enum HeightProbe {
    Observed(u64),
    Unreachable(RpcClientError),
}

fn confirm_height(
    primary: &dyn DaemonRpc,
    target: u64,
    policy: &RetryPolicy,
) -> Result<u64, ChainError> {
    let outcome = policy.poll(|attempt| match primary.get_info() {
        Ok(info) if info.blocks == target => Probe::Ready(info.blocks),
        Ok(info) if info.blocks > target => Probe::Fail(HeightProbe::Observed(info.blocks)),
        Ok(info) => {
            debug!(target: CHAIN_TARGET, attempt, height = info.blocks, target, "primary behind");
            Probe::Retry(HeightProbe::Observed(info.blocks))
        }
        Err(error) if error.is_retryable() => Probe::Retry(HeightProbe::Unreachable(error)),
        Err(error) => Probe::Fail(HeightProbe::Unreachable(error)),
    });
    outcome.map_err(|error| {
        let last = match error {
            RetryError::Exhausted { last, .. } | RetryError::Fatal(last) => last,
        };
        match last {
            HeightProbe::Observed(height) => ChainError::HeightMismatch {
                target,
                observed: Some(height),
            },
            HeightProbe::Unreachable(source) if source.is_retryable() => {
                ChainError::HeightMismatch {
                    target,
                    observed: None,
                }
            }
            HeightProbe::Unreachable(source) => ChainError::Step {
                step: ChainStep::Done,
                role: Role::Primary,
                source,
            },
        }
    })
}

pub(crate) fn mine_on(
    daemon: &dyn DaemonRpc,
    step: ChainStep,
    role: Role,
    count: u32,
    state: &mut ChainState,
) -> Result<(), ChainError> {
    let hashes = daemon.generate(count).map_err(step_failure(step, role))?;
    if u64::try_from(hashes.len()).ok() != Some(u64::from(count)) {
        return Err(ChainError::ShortGenerate {
            role,
            expected: count,
            actual: hashes.len(),
        });
    }
    state.record_blocks(count);
    debug!(
        target: CHAIN_TARGET,
        %step,
        %role,
        count,
        blocks_generated = state.blocks_generated(),
        "blocks mined"
    );
    Ok(())
}

pub(crate) fn step_failure(step: ChainStep, role: Role) -> impl Fn(RpcClientError) -> ChainError {
    move |source| ChainError::Step { step, role, source }
}
