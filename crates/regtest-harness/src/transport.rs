//! HTTP transport shared by the daemon RPC client and the indexer client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use thiserror::Error;

/// Connection-level failures talking to a daemon or the indexing service.
///
/// Every variant is retryable while waiting for a service to come up and
/// fatal once the service is expected to be serving.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// Underlying client error.
        #[source]
        source: Arc<reqwest::Error>,
    },
    /// The request never produced a response (refused, reset, timed out).
    #[error("request to {endpoint} failed: {source}")]
    Request {
        /// Endpoint the request targeted.
        endpoint: String,
        /// Underlying client error.
        #[source]
        source: Arc<reqwest::Error>,
    },
    /// The service answered with an unexpected HTTP status.
    #[error("{endpoint} answered with HTTP status {status}")]
    Status {
        /// Endpoint the request targeted.
        endpoint: String,
        /// Status code received.
        status: u16,
    },
}

impl TransportError {
    pub(crate) fn request(endpoint: &str, source: reqwest::Error) -> Self {
        Self::Request {
            endpoint: endpoint.to_owned(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn status(endpoint: &str, response: &Response) -> Self {
        Self::Status {
            endpoint: endpoint.to_owned(),
            status: response.status().as_u16(),
        }
    }
}

/// Builds a blocking client whose requests give up after `timeout`.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, TransportError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| TransportError::Client {
            source: Arc::new(source),
        })
}
