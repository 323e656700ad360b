//! The address re-use scenario: one address as both spender and recipient.
//!
//! A transaction funds a fresh address from one of the primary's coinbase
//! outputs and is confirmed; a second transaction spends that output back to
//! the same address and is confirmed. The indexing service must then report
//! two transactions for the address.

use std::collections::BTreeMap;

use tracing::info;

use super::{CHAIN_TARGET, ChainError, ChainState, ChainStep, mine_on, step_failure};
use crate::amount::Amount;
use crate::process::Role;
use crate::rpc::{DaemonCalls, DaemonRpc, OutPoint, PrevOut, UnspentOutput};

/// Addresses and transactions produced by the scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReuseOutcome {
    /// The address that both receives and spends.
    pub address: String,
    /// Transaction paying the address.
    pub funding_txid: String,
    /// Transaction spending from the address back to itself.
    pub spend_txid: String,
}

/// Amounts and fees of the re-use scenario.
pub struct AddressReuse<'a> {
    primary: &'a dyn DaemonRpc,
    secondary: &'a dyn DaemonRpc,
    amount: Amount,
    funding_fee: Amount,
    spend_fee: Amount,
}

impl<'a> AddressReuse<'a> {
    /// The scenario with 25 coins moved and the customary fees.
    #[must_use]
    pub const fn new(primary: &'a dyn DaemonRpc, secondary: &'a dyn DaemonRpc) -> Self {
        Self {
            primary,
            secondary,
            amount: Amount::from_coins(25),
            funding_fee: Amount::from_sat(10_000),
            spend_fee: Amount::from_sat(1_000),
        }
    }

    /// Runs both transactions, mining one block after each on the secondary.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Reuse`] when no primary output exceeds the
    /// amount plus the funding fee or signing is incomplete, and
    /// [`ChainError::Step`] when a daemon call fails.
    pub fn run(&self, state: &mut ChainState) -> Result<ReuseOutcome, ChainError> {
        let step = ChainStep::Done;
        let funding = self.spendable_output()?;
        let owner = funding
            .address
            .clone()
            .ok_or_else(|| ChainError::reuse("unspent output has no address"))?;
        let owner_key = self
            .primary
            .dump_priv_key(&owner)
            .map_err(step_failure(step, Role::Primary))?;

        let address = self
            .secondary
            .get_new_address()
            .map_err(step_failure(step, Role::Secondary))?;
        let change = self
            .secondary
            .get_new_address()
            .map_err(step_failure(step, Role::Secondary))?;
        let change_amount = funding
            .amount
            .checked_sub(self.amount)
            .and_then(|rest| rest.checked_sub(self.funding_fee))
            .ok_or_else(|| ChainError::reuse("unspent output too small to fund the address"))?;

        let outputs = BTreeMap::from([(address.clone(), self.amount), (change, change_amount)]);
        let funding_hex = self.sign(
            self.primary,
            Role::Primary,
            &[funding.outpoint()],
            &outputs,
            &[funding.prevout()],
            owner_key,
        )?;
        let decoded = self
            .secondary
            .decode_raw_transaction(&funding_hex)
            .map_err(step_failure(step, Role::Secondary))?;
        let paid = decoded
            .vout
            .iter()
            .find(|output| output.script_pub_key.pays(&address))
            .ok_or_else(|| ChainError::reuse("funding transaction does not pay the address"))?;
        let funding_txid = self.broadcast(&funding_hex, state)?;
        info!(target: CHAIN_TARGET, %address, txid = %funding_txid, "re-use address funded");

        let reused = PrevOut {
            txid: funding_txid.clone(),
            vout: paid.n,
            script_pub_key: paid.script_pub_key.hex.clone(),
            amount: paid.value,
        };
        let spend_amount = reused
            .amount
            .checked_sub(self.spend_fee)
            .ok_or_else(|| ChainError::reuse("funded output cannot cover the fee"))?;
        let address_key = self
            .secondary
            .dump_priv_key(&address)
            .map_err(step_failure(step, Role::Secondary))?;
        let spend_hex = self.sign(
            self.secondary,
            Role::Secondary,
            &[OutPoint {
                txid: reused.txid.clone(),
                vout: reused.vout,
            }],
            &BTreeMap::from([(address.clone(), spend_amount)]),
            &[reused],
            address_key,
        )?;
        let spend_txid = self.broadcast(&spend_hex, state)?;
        info!(target: CHAIN_TARGET, %address, txid = %spend_txid, "re-use address spent to itself");

        Ok(ReuseOutcome {
            address,
            funding_txid,
            spend_txid,
        })
    }

    fn spendable_output(&self) -> Result<UnspentOutput, ChainError> {
        let unspent = self
            .primary
            .list_unspent()
            .map_err(step_failure(ChainStep::Done, Role::Primary))?;
        let needed = self
            .amount
            .checked_add(self.funding_fee)
            .ok_or_else(|| ChainError::reuse("amount plus fee overflows"))?;
        // Change must be non-zero for the funding transaction to relay.
        unspent
            .into_iter()
            .find(|output| output.amount > needed)
            .ok_or_else(|| {
                ChainError::reuse("no unspent output is large enough to fund the address")
            })
    }

    fn sign(
        &self,
        signer: &dyn DaemonRpc,
        role: Role,
        inputs: &[OutPoint],
        outputs: &BTreeMap<String, Amount>,
        prevouts: &[PrevOut],
        key: String,
    ) -> Result<String, ChainError> {
        let unsigned = signer
            .create_raw_transaction(inputs, outputs)
            .map_err(step_failure(ChainStep::Done, role))?;
        let signed = signer
            .sign_raw_transaction(&unsigned, prevouts, &[key])
            .map_err(step_failure(ChainStep::Done, role))?;
        if signed.complete {
            Ok(signed.hex)
        } else {
            Err(ChainError::reuse(format!(
                "the {role} daemon could not fully sign the transaction"
            )))
        }
    }

    fn broadcast(&self, hex: &str, state: &mut ChainState) -> Result<String, ChainError> {
        let txid = self
            .secondary
            .send_raw_transaction(hex)
            .map_err(step_failure(ChainStep::Done, Role::Secondary))?;
        state.record_txid(txid.clone());
        mine_on(self.secondary, ChainStep::Done, Role::Secondary, 1, state)?;
        Ok(txid)
    }
}
