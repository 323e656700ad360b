//! Client for the dependent indexing service's HTTP API.
//!
//! Only `200` and `201` count as success; any other status, like a refused
//! connection, is a [`TransportError`].

mod node_config;
mod types;

#[cfg(test)]
mod tests;

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::transport::{TransportError, build_client};

pub use node_config::{CONFIG_FILE_NAME, INDEXER_SERVICES, IndexerNodeConfig};
pub use types::{AddressSummary, StatusInfo, StatusResponse, SyncStatus, TxPage, Utxo};

/// Log target for indexing service requests.
pub(crate) const INSIGHT_TARGET: &str = "regtest_harness::insight";

/// Failures querying the indexing service.
#[derive(Debug, Clone, Error)]
pub enum InsightError {
    /// The service was unreachable or answered with an error status.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The body was not the expected JSON.
    #[error("could not decode response from {endpoint}: {message}")]
    Decode {
        /// URL requested.
        endpoint: String,
        /// Decoder message.
        message: String,
    },
}

/// Blocking client bound to one indexing service.
#[derive(Debug, Clone)]
pub struct InsightClient {
    base: String,
    http: Client,
}

impl InsightClient {
    /// A client for `http://{host}:{port}/{route_prefix}`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] when the HTTP client cannot be
    /// built.
    pub fn new(
        host: &str,
        port: u16,
        route_prefix: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let prefix = route_prefix.trim_matches('/');
        let base = if prefix.is_empty() {
            format!("http://{host}:{port}")
        } else {
            format!("http://{host}:{port}/{prefix}")
        };
        Ok(Self {
            base,
            http: build_client(timeout)?,
        })
    }

    /// Base URL every route is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// `GET /status`.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn status(&self) -> Result<StatusResponse, InsightError> {
        self.get("/status")
    }

    /// `GET /sync`.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn sync_status(&self) -> Result<SyncStatus, InsightError> {
        self.get("/sync")
    }

    /// `GET /addr/{address}`.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn address(&self, address: &str) -> Result<AddressSummary, InsightError> {
        self.get(&format!("/addr/{address}"))
    }

    /// `GET /addr/{address}/utxo`.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn address_utxos(&self, address: &str) -> Result<Vec<Utxo>, InsightError> {
        self.get(&format!("/addr/{address}/utxo"))
    }

    /// `GET /addrs/{a,b,...}/utxo`.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn multi_address_utxos(&self, addresses: &[&str]) -> Result<Vec<Utxo>, InsightError> {
        self.get(&format!("/addrs/{}/utxo", addresses.join(",")))
    }

    /// `POST /addrs/utxo` with `{"addrs": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn post_address_utxos(&self, addresses: &[&str]) -> Result<Vec<Utxo>, InsightError> {
        self.post_addresses("/addrs/utxo", addresses)
    }

    /// `GET /addrs/{a,b,...}/txs`.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn multi_address_txs(&self, addresses: &[&str]) -> Result<TxPage, InsightError> {
        self.get(&format!("/addrs/{}/txs", addresses.join(",")))
    }

    /// `POST /addrs/txs` with `{"addrs": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn post_address_txs(&self, addresses: &[&str]) -> Result<TxPage, InsightError> {
        self.post_addresses("/addrs/txs", addresses)
    }

    /// `GET /addr/{address}/totalReceived`, in satoshis.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn total_received(&self, address: &str) -> Result<u64, InsightError> {
        self.get(&format!("/addr/{address}/totalReceived"))
    }

    /// `GET /addr/{address}/totalSent`, in satoshis.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn total_sent(&self, address: &str) -> Result<u64, InsightError> {
        self.get(&format!("/addr/{address}/totalSent"))
    }

    /// `GET /addr/{address}/unconfirmedBalance`, in satoshis.
    ///
    /// # Errors
    ///
    /// Returns [`InsightError`] on transport or decode failure.
    pub fn unconfirmed_balance(&self, address: &str) -> Result<u64, InsightError> {
        self.get(&format!("/addr/{address}/unconfirmedBalance"))
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base)
    }

    fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T, InsightError> {
        let url = self.url(route);
        Self::fetch(&url, self.http.get(&url))
    }

    fn post_addresses<T: DeserializeOwned>(
        &self,
        route: &str,
        addresses: &[&str],
    ) -> Result<T, InsightError> {
        let url = self.url(route);
        Self::fetch(&url, self.http.post(&url).json(&json!({ "addrs": addresses })))
    }

    fn fetch<T: DeserializeOwned>(url: &str, request: RequestBuilder) -> Result<T, InsightError> {
        debug!(target: INSIGHT_TARGET, %url, "querying indexing service");
        let response = request
            .send()
            .map_err(|error| TransportError::request(url, error))?;
        if !matches!(response.status().as_u16(), 200 | 201) {
            return Err(TransportError::status(url, &response).into());
        }
        let body = response
            .text()
            .map_err(|error| TransportError::request(url, error))?;
        serde_json::from_str(&body).map_err(|error| InsightError::Decode {
            endpoint: url.to_owned(),
            message: error.to_string(),
        })
    }
}
