//! Unit tests for the indexing service client and its configuration.

use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;
use crate::amount::Amount;
use crate::tests::support::fake_http::{FakeHttpServer, FakeResponse, RecordedRequest};

const PRIMARY: &str = "mPrimaryAddr";
const SECONDARY: &str = "mSecondaryAddr";

fn utxo_body() -> Value {
    json!([{
        "address": PRIMARY,
        "txid": "f00d",
        "vout": 1,
        "scriptPubKey": "76a914",
        "amount": 20,
        "satoshis": 2_000_000_000_u64,
        "height": 114,
        "confirmations": 6
    }])
}

fn route(request: &RecordedRequest) -> FakeResponse {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/api/status") => FakeResponse::ok(&json!({
            "info": {
                "version": 120_100,
                "protocolversion": 70012,
                "blocks": 114,
                "timeoffset": 0,
                "connections": 1,
                "proxy": "",
                "difficulty": 4.656_542_373_906_925e-10,
                "testnet": false,
                "relayfee": 0.000_01,
                "errors": "",
                "network": "regtest"
            }
        })),
        ("GET", "/api/sync") => FakeResponse::ok(&json!({
            "status": "finished",
            "blockChainHeight": 114,
            "syncPercentage": 100,
            "height": 114,
            "error": null,
            "type": "bitcore node"
        })),
        ("GET", "/api/addr/mSecondaryAddr") => FakeResponse::ok(&json!({
            "addrStr": SECONDARY,
            "balance": 0,
            "balanceSat": 0,
            "totalReceived": 25,
            "totalReceivedSat": 2_500_000_000_u64,
            "totalSent": 25,
            "totalSentSat": 2_500_000_000_u64,
            "unconfirmedBalance": 0,
            "unconfirmedBalanceSat": 0,
            "transactions": ["t2", "t1"]
        })),
        ("GET", "/api/addr/mPrimaryAddr/utxo" | "/api/addrs/mSecondaryAddr,mPrimaryAddr/utxo")
        | ("POST", "/api/addrs/utxo") => FakeResponse::ok(&utxo_body()),
        ("GET", "/api/addrs/mPrimaryAddr,mSecondaryAddr/txs") | ("POST", "/api/addrs/txs") => {
            FakeResponse::json(
                201,
                &json!({"totalItems": 3, "from": 0, "to": 3, "items": [{}, {}, {}]}),
            )
        }
        ("GET", "/api/addr/mPrimaryAddr/totalReceived") => FakeResponse::ok(&json!(2_000_000_000_u64)),
        ("GET", "/api/addr/mPrimaryAddr/totalSent" | "/api/addr/mPrimaryAddr/unconfirmedBalance") => {
            FakeResponse::ok(&json!(0))
        }
        ("GET", "/api/addr/garbled") => FakeResponse {
            status: 200,
            body: "<html>".to_owned(),
        },
        _ => FakeResponse::json(404, &json!({"error": "not found"})),
    }
}

#[fixture]
fn indexer() -> FakeHttpServer {
    FakeHttpServer::spawn(route).expect("spawn fake indexer")
}

fn client(server: &FakeHttpServer) -> InsightClient {
    InsightClient::new("127.0.0.1", server.port(), "api", Duration::from_secs(5)).expect("client")
}

#[rstest]
#[case("api", "http://127.0.0.1:53001/api")]
#[case("/api/", "http://127.0.0.1:53001/api")]
#[case("", "http://127.0.0.1:53001")]
fn base_url_includes_route_prefix(#[case] prefix: &str, #[case] expected: &str) {
    let client =
        InsightClient::new("127.0.0.1", 53001, prefix, Duration::from_secs(1)).expect("client");

    assert_eq!(client.base_url(), expected);
}

#[rstest]
fn status_reports_indexed_height(indexer: FakeHttpServer) {
    let status = client(&indexer).status().expect("status");

    assert_eq!(status.info.blocks, 114);
    assert_eq!(status.info.network, "regtest");
    assert_eq!(status.info.connections, 1);
}

#[rstest]
fn sync_status_decodes_renamed_fields(indexer: FakeHttpServer) {
    let sync = client(&indexer).sync_status().expect("sync");

    assert_eq!(sync.status, "finished");
    assert_eq!(sync.block_chain_height, 114);
    assert_eq!(sync.kind, "bitcore node");
    assert!(sync.error.is_none());
}

#[rstest]
fn address_summary_decodes_exact_amounts(indexer: FakeHttpServer) {
    let summary = client(&indexer).address(SECONDARY).expect("address");

    assert_eq!(summary.balance, Amount::ZERO);
    assert_eq!(summary.total_sent, Amount::from_coins(25));
    assert_eq!(summary.transactions.len(), 2);
}

#[rstest]
fn get_and_post_utxo_forms_agree(indexer: FakeHttpServer) {
    let client = client(&indexer);

    let single = client.address_utxos(PRIMARY).expect("single");
    let multi = client
        .multi_address_utxos(&[SECONDARY, PRIMARY])
        .expect("multi");
    let posted = client
        .post_address_utxos(&[PRIMARY, SECONDARY])
        .expect("posted");

    assert_eq!(multi, posted);
    assert_eq!(single, multi);
    let utxo = single.first().expect("one utxo");
    assert_eq!(utxo.amount, Amount::from_coins(20));
    assert_eq!(utxo.satoshis, 2_000_000_000);
    assert_eq!(utxo.confirmations, 6);

    let requests = indexer.requests().expect("requests");
    let post = requests
        .iter()
        .find(|request| request.method == "POST")
        .expect("post recorded");
    assert_eq!(post.json(), json!({"addrs": [PRIMARY, SECONDARY]}));
}

#[rstest]
fn created_status_counts_as_success(indexer: FakeHttpServer) {
    let client = client(&indexer);

    let listed = client
        .multi_address_txs(&[PRIMARY, SECONDARY])
        .expect("get txs");
    let posted = client
        .post_address_txs(&[PRIMARY, SECONDARY])
        .expect("post txs");

    assert_eq!(listed, posted);
    assert_eq!((listed.items.len(), listed.from, listed.to), (3, 0, 3));
    assert_eq!(listed.total_items, Some(3));
}

#[rstest]
fn totals_are_satoshi_counts(indexer: FakeHttpServer) {
    let client = client(&indexer);

    assert_eq!(client.total_received(PRIMARY).expect("received"), 2_000_000_000);
    assert_eq!(client.total_sent(PRIMARY).expect("sent"), 0);
    assert_eq!(client.unconfirmed_balance(PRIMARY).expect("unconfirmed"), 0);
}

#[rstest]
fn error_status_is_transport_failure(indexer: FakeHttpServer) {
    let error = client(&indexer)
        .address("unknown")
        .expect_err("404 must fail");

    assert!(matches!(
        error,
        InsightError::Transport(TransportError::Status { status: 404, .. })
    ));
}

#[rstest]
fn unparsable_body_is_decode_failure(indexer: FakeHttpServer) {
    let error = client(&indexer)
        .address("garbled")
        .expect_err("html must fail");

    assert!(matches!(error, InsightError::Decode { endpoint, .. } if endpoint.ends_with("/api/addr/garbled")));
}

#[rstest]
fn node_config_matches_the_service_layout() {
    let dir = TempDir::new().expect("temp dir");
    let datadir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8");
    let config = IndexerNodeConfig::regtest(53001, &datadir, 18444, "api");

    let path = config.write().expect("write config");
    let written: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");

    assert_eq!(path, datadir.join(CONFIG_FILE_NAME));
    assert_eq!(
        written,
        json!({
            "network": "regtest",
            "port": 53001,
            "datadir": datadir.as_str(),
            "services": INDEXER_SERVICES,
            "servicesConfig": {
                "p2p": {"peers": [{"ip": {"v4": "127.0.0.1"}, "port": 18444}]},
                "insight-api": {"routePrefix": "api"}
            }
        })
    );
}

#[rstest]
fn node_config_write_failure_is_reported() {
    let config = IndexerNodeConfig::regtest(
        53001,
        &Utf8PathBuf::from("/nonexistent/regtest-indexer"),
        18444,
        "api",
    );

    let error = config.write().expect_err("directory is missing");

    assert!(matches!(error, crate::process::SpawnError::WriteConfig { .. }));
}
