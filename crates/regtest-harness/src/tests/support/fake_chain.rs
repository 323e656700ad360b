//! An in-memory pair of regtest daemons sharing one ledger.
//!
//! Each [`FakeNode`] answers the daemon methods the chain builder and the
//! re-use scenario issue. Blocks mined on either node raise the shared
//! height. Failures can be injected per role and method, and the primary can
//! be made to lag behind blocks mined on the secondary. The same ledger can
//! back fake HTTP servers so a whole harness run works without daemons.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};

use super::fake_http::{FakeResponse, RecordedRequest};
use crate::process::Role;
use crate::rpc::{DaemonRpc, RpcClientError, RpcError};

#[derive(Debug, Default)]
struct Ledger {
    height: u64,
    connections: BTreeMap<Role, u32>,
    counter: u32,
    raw: BTreeMap<String, Vec<(String, Value)>>,
    calls: Vec<(Role, String, Vec<Value>)>,
    failures: BTreeMap<(Role, String), RpcError>,
    primary_lag: u64,
    unspent: Vec<Value>,
    balances: BTreeMap<Role, Value>,
}

impl Ledger {
    fn fresh(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}-{}", self.counter)
    }

    fn handle(&mut self, role: Role, method: &str, params: &[Value]) -> Result<Value, RpcClientError> {
        self.calls.push((role, method.to_owned(), params.to_vec()));
        if let Some(error) = self.failures.get(&(role, method.to_owned())) {
            return Err(error.clone().into());
        }
        let text_param = |index: usize| {
            params
                .get(index)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let result = match method {
            "getinfo" => {
                let reported = if role == Role::Primary && self.primary_lag > 0 {
                    let lagging = self.height.saturating_sub(self.primary_lag);
                    self.primary_lag -= 1;
                    lagging
                } else {
                    self.height
                };
                json!({
                    "version": 120_100,
                    "blocks": reported,
                    "connections": self.connections.get(&role).copied().unwrap_or(1),
                    "testnet": false,
                    "errors": ""
                })
            }
            "generate" => {
                let count = params.first().and_then(Value::as_u64).unwrap_or(0);
                let first = self.height + 1;
                self.height += count;
                json!((first..=self.height).map(|h| format!("block-{h}")).collect::<Vec<_>>())
            }
            "getnewaddress" => json!(self.fresh(&format!("{role}-addr"))),
            "sendtoaddress" | "sendrawtransaction" => json!(self.fresh("tx")),
            "getbalance" => self.balances.get(&role).cloned().unwrap_or_else(|| json!(50.0)),
            "listunspent" => Value::Array(self.unspent.clone()),
            "dumpprivkey" => json!(format!("key-{}", text_param(0))),
            "createrawtransaction" => {
                let hex = self.fresh("raw");
                let outputs = params
                    .get(1)
                    .and_then(Value::as_object)
                    .map(|outputs| {
                        outputs
                            .iter()
                            .map(|(address, value)| (address.clone(), value.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                self.raw.insert(hex.clone(), outputs);
                json!(hex)
            }
            "signrawtransaction" => json!({"hex": format!("signed-{}", text_param(0)), "complete": true}),
            "decoderawtransaction" => {
                let signed = text_param(0);
                let unsigned = signed.trim_start_matches("signed-");
                let vout: Vec<Value> = self
                    .raw
                    .get(unsigned)
                    .map(|outputs| {
                        outputs
                            .iter()
                            .enumerate()
                            .map(|(n, (address, value))| {
                                json!({
                                    "value": value,
                                    "n": n,
                                    "scriptPubKey": {"hex": format!("script-{address}"), "addresses": [address]}
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                json!({"txid": format!("decoded-{unsigned}"), "vout": vout})
            }
            other => {
                return Err(RpcError {
                    method: other.to_owned(),
                    code: -32601,
                    message: "Method not found".to_owned(),
                }
                .into());
            }
        };
        Ok(result)
    }
}

/// Shared ledger behind two fake daemons.
#[derive(Debug, Clone)]
pub(crate) struct FakeRegtest {
    ledger: Arc<Mutex<Ledger>>,
}

impl Default for FakeRegtest {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRegtest {
    pub fn new() -> Self {
        let ledger = Ledger {
            connections: BTreeMap::from([(Role::Primary, 1), (Role::Secondary, 1)]),
            unspent: vec![json!({
                "txid": "coinbase-tx",
                "vout": 0,
                "address": "primary-coinbase",
                "scriptPubKey": "76a914coinbase88ac",
                "amount": 50.0,
                "confirmations": 114
            })],
            ..Ledger::default()
        };
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        lock(&self.ledger)
    }

    pub fn node(&self, role: Role) -> FakeNode {
        FakeNode {
            role,
            ledger: Arc::clone(&self.ledger),
        }
    }

    /// A fake HTTP handler answering JSON-RPC envelopes as `role`.
    pub fn rpc_handler(
        &self,
        role: Role,
    ) -> impl Fn(&RecordedRequest) -> FakeResponse + Send + Sync + 'static {
        let ledger = Arc::clone(&self.ledger);
        move |request| {
            let envelope = request.json();
            let method = envelope["method"].as_str().unwrap_or_default().to_owned();
            let params = envelope["params"].as_array().cloned().unwrap_or_default();
            match lock(&ledger).handle(role, &method, &params) {
                Ok(result) => FakeResponse::rpc_result(result),
                Err(RpcClientError::Rpc(error)) => {
                    FakeResponse::rpc_error(500, error.code, &error.message)
                }
                Err(_) => FakeResponse::json(500, &Value::Null),
            }
        }
    }

    /// A fake HTTP handler serving `/status` with the ledger height.
    pub fn status_handler(
        &self,
        route_prefix: &'static str,
    ) -> impl Fn(&RecordedRequest) -> FakeResponse + Send + Sync + 'static {
        let ledger = Arc::clone(&self.ledger);
        move |request| {
            if request.path == format!("/{route_prefix}/status") {
                FakeResponse::ok(&json!({"info": {"blocks": lock(&ledger).height}}))
            } else {
                FakeResponse::json(404, &Value::Null)
            }
        }
    }

    pub fn set_connections(&self, role: Role, connections: u32) {
        self.ledger().connections.insert(role, connections);
    }

    pub fn fail(&self, role: Role, method: &str, code: i64) {
        self.ledger().failures.insert(
            (role, method.to_owned()),
            RpcError {
                method: method.to_owned(),
                code,
                message: format!("{method} rejected"),
            },
        );
    }

    pub fn lag_primary(&self, blocks: u64) {
        self.ledger().primary_lag = blocks;
    }

    pub fn empty_wallet(&self) {
        self.ledger().unspent.clear();
    }

    /// Lists `output` before every other unspent output.
    pub fn prepend_unspent(&self, output: Value) {
        self.ledger().unspent.insert(0, output);
    }

    pub fn set_balance(&self, role: Role, coins: Value) {
        self.ledger().balances.insert(role, coins);
    }

    pub fn height(&self) -> u64 {
        self.ledger().height
    }

    /// Methods called on `role`, in order.
    pub fn methods(&self, role: Role) -> Vec<String> {
        self.ledger()
            .calls
            .iter()
            .filter(|(caller, _, _)| *caller == role)
            .map(|(_, method, _)| method.clone())
            .collect()
    }

    /// Every `generate` count issued on `role`.
    pub fn generated(&self, role: Role) -> Vec<u64> {
        self.ledger()
            .calls
            .iter()
            .filter(|(caller, method, _)| *caller == role && method == "generate")
            .filter_map(|(_, _, params)| params.first().and_then(Value::as_u64))
            .collect()
    }

    /// Parameters of the first call to `method` on `role`.
    pub fn params_of(&self, role: Role, method: &str) -> Option<Vec<Value>> {
        self.ledger()
            .calls
            .iter()
            .find(|(caller, called, _)| *caller == role && called == method)
            .map(|(_, _, params)| params.clone())
    }
}

/// One daemon of a [`FakeRegtest`].
#[derive(Debug)]
pub(crate) struct FakeNode {
    role: Role,
    ledger: Arc<Mutex<Ledger>>,
}

impl DaemonRpc for FakeNode {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcClientError> {
        lock(&self.ledger).handle(self.role, method, &params)
    }

    fn endpoint(&self) -> String {
        format!("fake-{}", self.role)
    }
}

fn lock(ledger: &Mutex<Ledger>) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}
