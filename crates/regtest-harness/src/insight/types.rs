//! Response shapes of the indexing service's HTTP API.

use serde::Deserialize;
use serde_json::Value;

use crate::amount::Amount;

/// `GET /status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    /// Node summary.
    pub info: StatusInfo,
}

/// Node summary published under `/status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusInfo {
    /// Backing daemon version.
    pub version: u64,
    /// P2P protocol version.
    pub protocolversion: u64,
    /// Indexed chain height.
    pub blocks: u64,
    /// Clock offset from peers, in seconds.
    pub timeoffset: i64,
    /// Connected peers.
    pub connections: u32,
    /// Proxy in use, if any.
    pub proxy: String,
    /// Current difficulty.
    pub difficulty: f64,
    /// Whether the node runs on a test network.
    pub testnet: bool,
    /// Minimum relay fee.
    pub relayfee: f64,
    /// Last warning or error string.
    pub errors: String,
    /// Network name.
    pub network: String,
}

/// `GET /sync`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncStatus {
    /// `syncing`, `finished` or `error`.
    pub status: String,
    /// Height of the backing chain.
    #[serde(rename = "blockChainHeight")]
    pub block_chain_height: u64,
    /// Percentage indexed.
    #[serde(rename = "syncPercentage")]
    pub sync_percentage: f64,
    /// Height indexed so far.
    pub height: u64,
    /// Error message, if syncing failed.
    pub error: Option<String>,
    /// Sync source type.
    #[serde(rename = "type")]
    pub kind: String,
}

/// `GET /addr/{address}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddressSummary {
    /// The address.
    pub addr_str: String,
    /// Confirmed balance.
    pub balance: Amount,
    /// Confirmed balance in satoshis.
    pub balance_sat: u64,
    /// Total ever received.
    pub total_received: Amount,
    /// Total received in satoshis.
    pub total_received_sat: u64,
    /// Total ever sent.
    pub total_sent: Amount,
    /// Total sent in satoshis.
    pub total_sent_sat: u64,
    /// Unconfirmed balance.
    pub unconfirmed_balance: Amount,
    /// Unconfirmed balance in satoshis.
    pub unconfirmed_balance_sat: u64,
    /// Transaction ids touching the address.
    pub transactions: Vec<String>,
}

/// One entry of the UTXO endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Utxo {
    /// Address the output pays.
    pub address: String,
    /// Funding transaction id.
    pub txid: String,
    /// Output index.
    pub vout: u32,
    /// Locking script as hex.
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: String,
    /// Output value.
    pub amount: Amount,
    /// Output value in satoshis.
    pub satoshis: u64,
    /// Height of the confirming block, if confirmed.
    #[serde(default)]
    pub height: Option<u64>,
    /// Confirmations so far.
    pub confirmations: u64,
}

/// A page of the transaction-history endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TxPage {
    /// Total transactions across every page.
    #[serde(rename = "totalItems", default)]
    pub total_items: Option<u64>,
    /// Index of the first item.
    pub from: u64,
    /// Index after the last item.
    pub to: u64,
    /// Transactions on this page.
    pub items: Vec<Value>,
}
