//! JSON-RPC client bound to a single daemon.
//!
//! [`RpcClient`] posts JSON-RPC 1.0 envelopes with basic authentication.
//! Chain building talks to daemons through the [`DaemonRpc`] seam; the
//! [`DaemonCalls`] extension layers typed helpers for every method the
//! harness drives on top of the raw `call`.

mod error;
mod jsonrpc;
mod types;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::amount::Amount;
use crate::transport::{TransportError, build_client};

pub use error::{RPC_IN_WARMUP, RpcClientError, RpcError};
pub use jsonrpc::{RpcErrorObject, RpcRequest, RpcResponse};
pub use types::{
    DecodedOutput, DecodedScript, DecodedTransaction, NodeInfo, OutPoint, PrevOut,
    SignedTransaction, UnspentOutput,
};

/// Log target for RPC traffic.
pub(crate) const RPC_TARGET: &str = "regtest_harness::rpc";

/// Address and credentials of one daemon's RPC server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    /// Host name or address.
    pub host: String,
    /// RPC port.
    pub port: u16,
    /// Basic-auth user.
    pub user: String,
    /// Basic-auth password.
    pub password: String,
}

impl RpcEndpoint {
    /// URL the JSON-RPC envelopes are posted to.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for RpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Raw access to one daemon's RPC interface.
#[cfg_attr(test, mockall::automock)]
pub trait DaemonRpc {
    /// Calls `method` with positional `params` and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`RpcClientError`] when the daemon is unreachable, rejects
    /// the call, or answers with something that is not a JSON-RPC response.
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcClientError>;

    /// Human-readable label of the daemon endpoint.
    fn endpoint(&self) -> String;
}

/// Blocking JSON-RPC client bound to exactly one daemon.
#[derive(Debug)]
pub struct RpcClient {
    endpoint: RpcEndpoint,
    url: String,
    http: Client,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] when the HTTP client cannot be
    /// built.
    pub fn new(endpoint: RpcEndpoint, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            url: endpoint.url(),
            endpoint,
            http: build_client(timeout)?,
            next_id: AtomicU64::new(1),
        })
    }

    /// The endpoint this client is bound to.
    #[must_use]
    pub const fn rpc_endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }
}

impl DaemonRpc for RpcClient {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: RPC_TARGET,
            endpoint = %self.endpoint,
            method,
            id,
            "sending RPC request"
        );
        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.endpoint.user, Some(&self.endpoint.password))
            .json(&RpcRequest::new(id, method, &params))
            .send()
            .map_err(|error| TransportError::request(&self.url, error))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|error| TransportError::request(&self.url, error))?;
        classify_response(&self.url, method, status, &body)
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Turns an HTTP status and body into the call's outcome.
///
/// Daemons send error payloads with non-2xx statuses, so a parsable error
/// object wins over the status code.
pub(crate) fn classify_response(
    url: &str,
    method: &str,
    status: u16,
    body: &str,
) -> Result<Value, RpcClientError> {
    let success = (200..300).contains(&status);
    match serde_json::from_str::<RpcResponse>(body) {
        Ok(RpcResponse {
            error: Some(error), ..
        }) => Err(RpcError {
            method: method.to_owned(),
            code: error.code,
            message: error.message,
        }
        .into()),
        Ok(response) if success => Ok(response.result.unwrap_or(Value::Null)),
        Err(error) if success => Err(RpcClientError::codec(method, &error)),
        Ok(_) | Err(_) => Err(TransportError::Status {
            endpoint: url.to_owned(),
            status,
        }
        .into()),
    }
}

/// Typed helpers over [`DaemonRpc::call`].
pub trait DaemonCalls: DaemonRpc {
    /// Calls `method` and decodes its result as `R`.
    ///
    /// # Errors
    ///
    /// Returns the call's error, or [`RpcClientError::Codec`] when the
    /// result has an unexpected shape.
    fn call_as<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<R, RpcClientError> {
        let value = self.call(method, params)?;
        serde_json::from_value(value).map_err(|error| RpcClientError::codec(method, &error))
    }

    /// `getinfo`.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn get_info(&self) -> Result<NodeInfo, RpcClientError> {
        self.call_as("getinfo", Vec::new())
    }

    /// `generate(count)`; returns the mined block hashes.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn generate(&self, count: u32) -> Result<Vec<String>, RpcClientError> {
        self.call_as("generate", vec![json!(count)])
    }

    /// `getnewaddress`.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn get_new_address(&self) -> Result<String, RpcClientError> {
        self.call_as("getnewaddress", Vec::new())
    }

    /// `sendtoaddress(address, amount)`; returns the transaction id.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn send_to_address(&self, address: &str, amount: Amount) -> Result<String, RpcClientError> {
        self.call_as("sendtoaddress", vec![json!(address), amount.to_json()])
    }

    /// `getbalance`.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn get_balance(&self) -> Result<Amount, RpcClientError> {
        self.call_as("getbalance", Vec::new())
    }

    /// `listunspent`.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn list_unspent(&self) -> Result<Vec<UnspentOutput>, RpcClientError> {
        self.call_as("listunspent", Vec::new())
    }

    /// `dumpprivkey(address)`.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn dump_priv_key(&self, address: &str) -> Result<String, RpcClientError> {
        self.call_as("dumpprivkey", vec![json!(address)])
    }

    /// `createrawtransaction(inputs, outputs)`; returns unsigned hex.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn create_raw_transaction(
        &self,
        inputs: &[OutPoint],
        outputs: &BTreeMap<String, Amount>,
    ) -> Result<String, RpcClientError> {
        let outputs: Map<String, Value> = outputs
            .iter()
            .map(|(address, amount)| (address.clone(), amount.to_json()))
            .collect();
        self.call_as(
            "createrawtransaction",
            vec![json!(inputs), Value::Object(outputs)],
        )
    }

    /// `signrawtransaction(hex, prevouts, keys)`.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn sign_raw_transaction(
        &self,
        hex: &str,
        prevouts: &[PrevOut],
        keys: &[String],
    ) -> Result<SignedTransaction, RpcClientError> {
        self.call_as(
            "signrawtransaction",
            vec![json!(hex), json!(prevouts), json!(keys)],
        )
    }

    /// `decoderawtransaction(hex)`.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn decode_raw_transaction(&self, hex: &str) -> Result<DecodedTransaction, RpcClientError> {
        self.call_as("decoderawtransaction", vec![json!(hex)])
    }

    /// `sendrawtransaction(hex)`; returns the transaction id.
    ///
    /// # Errors
    ///
    /// See [`DaemonCalls::call_as`].
    fn send_raw_transaction(&self, hex: &str) -> Result<String, RpcClientError> {
        self.call_as("sendrawtransaction", vec![json!(hex)])
    }
}

impl<T: DaemonRpc + ?Sized> DaemonCalls for T {}
