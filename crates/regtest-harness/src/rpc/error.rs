//! Error types for daemon RPC calls.

use thiserror::Error;

use crate::transport::TransportError;

/// Code the daemon returns while it is still loading and not yet serving.
pub const RPC_IN_WARMUP: i64 = -28;

/// The daemon received the call and rejected it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{method} rejected with code {code}: {message}")]
pub struct RpcError {
    /// Method that was called.
    pub method: String,
    /// Daemon error code.
    pub code: i64,
    /// Daemon error message.
    pub message: String,
}

/// Failures of a single RPC call.
#[derive(Debug, Clone, Error)]
pub enum RpcClientError {
    /// The daemon could not be reached or answered with a bare HTTP error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The daemon rejected the call with an error payload.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The response did not have the expected shape.
    #[error("could not decode {method} response: {message}")]
    Codec {
        /// Method that was called.
        method: String,
        /// Decoder message.
        message: String,
    },
}

impl RpcClientError {
    pub(crate) fn codec(method: &str, error: &serde_json::Error) -> Self {
        Self::Codec {
            method: method.to_owned(),
            message: error.to_string(),
        }
    }

    /// Whether the daemon is merely not serving yet.
    ///
    /// Transport failures and the warm-up code are retryable while waiting
    /// for readiness; any other rejection is final.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rpc(error) => error.code == RPC_IN_WARMUP,
            Self::Codec { .. } => false,
        }
    }
}
