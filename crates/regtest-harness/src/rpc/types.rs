//! Typed results of the daemon methods the harness drives.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// Subset of the `getinfo` result the harness relies on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeInfo {
    /// Current chain height.
    pub blocks: u64,
    /// Number of connected peers.
    pub connections: u32,
    /// Daemon version number.
    #[serde(default)]
    pub version: u64,
    /// Whether the daemon runs on a test network.
    #[serde(default)]
    pub testnet: bool,
    /// Last warning or error string.
    #[serde(default)]
    pub errors: String,
}

/// One entry of `listunspent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnspentOutput {
    /// Funding transaction id.
    pub txid: String,
    /// Output index within the funding transaction.
    pub vout: u32,
    /// Address the output pays, when the wallet knows it.
    #[serde(default)]
    pub address: Option<String>,
    /// Locking script as hex.
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    /// Output value.
    pub amount: Amount,
    /// Confirmations so far.
    pub confirmations: u64,
}

impl UnspentOutput {
    /// The outpoint that spends this output.
    #[must_use]
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            vout: self.vout,
        }
    }

    /// The previous-output description `signrawtransaction` needs.
    #[must_use]
    pub fn prevout(&self) -> PrevOut {
        PrevOut {
            txid: self.txid.clone(),
            vout: self.vout,
            script_pub_key: self.script_pub_key.clone(),
            amount: self.amount,
        }
    }
}

/// A reference to a transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutPoint {
    /// Transaction id.
    pub txid: String,
    /// Output index.
    pub vout: u32,
}

/// A previous output supplied to the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrevOut {
    /// Transaction id.
    pub txid: String,
    /// Output index.
    pub vout: u32,
    /// Locking script as hex.
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    /// Output value.
    pub amount: Amount,
}

/// Result of `signrawtransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignedTransaction {
    /// Signed transaction hex.
    pub hex: String,
    /// Whether every input is fully signed.
    pub complete: bool,
}

/// Subset of `decoderawtransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecodedTransaction {
    /// Transaction id.
    pub txid: String,
    /// Outputs in order.
    pub vout: Vec<DecodedOutput>,
}

/// One decoded output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecodedOutput {
    /// Output value.
    pub value: Amount,
    /// Output index.
    pub n: u32,
    /// Locking script.
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: DecodedScript,
}

/// Locking script of a decoded output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecodedScript {
    /// Script as hex.
    pub hex: String,
    /// Addresses the script pays (older daemons).
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Address the script pays (newer daemons).
    #[serde(default)]
    pub address: Option<String>,
}

impl DecodedScript {
    /// Whether the script pays `address`.
    #[must_use]
    pub fn pays(&self, address: &str) -> bool {
        self.address.as_deref() == Some(address)
            || self.addresses.iter().any(|candidate| candidate == address)
    }
}
