//! JSON-RPC 1.0 envelopes spoken by the blockchain daemons.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request envelope; the daemon answers with the same `id`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    /// Protocol version, always "1.0".
    pub jsonrpc: &'static str,
    /// Request identifier.
    pub id: u64,
    /// Remote method name.
    pub method: &'a str,
    /// Positional parameters.
    pub params: &'a [Value],
}

impl<'a> RpcRequest<'a> {
    /// Creates a request for `method` with positional `params`.
    #[must_use]
    pub const fn new(id: u64, method: &'a str, params: &'a [Value]) -> Self {
        Self {
            jsonrpc: "1.0",
            id,
            method,
            params,
        }
    }
}

/// A response envelope. Exactly one of `result` and `error` is meaningful.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Result on success; absent or null for methods without a result.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error object on failure.
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    /// Identifier echoed from the request.
    #[serde(default)]
    pub id: Option<Value>,
}

/// The daemon's structured error payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RpcErrorObject {
    /// Daemon error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}
