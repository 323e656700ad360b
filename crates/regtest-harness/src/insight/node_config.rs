//! The configuration document the indexing service starts from.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::process::SpawnError;

/// File name the service reads from its working directory.
pub const CONFIG_FILE_NAME: &str = "btccore-node.json";

/// Services enabled on the indexing node, in start order.
pub const INDEXER_SERVICES: [&str; 11] = [
    "p2p",
    "db",
    "header",
    "block",
    "address",
    "transaction",
    "mempool",
    "web",
    "insight-api",
    "fee",
    "timestamp",
];

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexerNodeConfig {
    network: String,
    port: u16,
    datadir: Utf8PathBuf,
    services: Vec<String>,
    #[serde(rename = "servicesConfig")]
    services_config: ServicesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ServicesConfig {
    p2p: P2pConfig,
    #[serde(rename = "insight-api")]
    insight_api: InsightApiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct P2pConfig {
    peers: Vec<PeerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PeerConfig {
    ip: PeerAddress,
    port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PeerAddress {
    v4: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct InsightApiConfig {
    #[serde(rename = "routePrefix")]
    route_prefix: String,
}

impl IndexerNodeConfig {
    /// A regtest node serving HTTP on `port` and peering with the local
    /// daemon on `p2p_port`.
    #[must_use]
    pub fn regtest(port: u16, datadir: &Utf8Path, p2p_port: u16, route_prefix: &str) -> Self {
        Self {
            network: "regtest".to_owned(),
            port,
            datadir: datadir.to_owned(),
            services: INDEXER_SERVICES.iter().map(|&name| name.to_owned()).collect(),
            services_config: ServicesConfig {
                p2p: P2pConfig {
                    peers: vec![PeerConfig {
                        ip: PeerAddress {
                            v4: "127.0.0.1".to_owned(),
                        },
                        port: p2p_port,
                    }],
                },
                insight_api: InsightApiConfig {
                    route_prefix: route_prefix.to_owned(),
                },
            },
        }
    }

    /// Where the document is written.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.datadir.join(CONFIG_FILE_NAME)
    }

    /// Writes the document into the data directory.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::WriteConfig`] when serialisation or the write
    /// fails.
    pub fn write(&self) -> Result<Utf8PathBuf, SpawnError> {
        let path = self.path();
        let failed = |source: io::Error| SpawnError::WriteConfig {
            path: path.clone(),
            source: source.into(),
        };
        let document = serde_json::to_string_pretty(self).map_err(|error| failed(error.into()))?;
        fs::write(&path, document).map_err(failed)?;
        Ok(path)
    }
}
