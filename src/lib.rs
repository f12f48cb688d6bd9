#![cfg_attr(docsrs, feature(doc_cfg))]
//! A REST service answering "which of these outputs are still unspent?"
//! against a point-in-time consistent view of the chain and the transaction
//! pool, together with a client for it.
//!
//! Every answer carries the chain tip it was computed against. The tip, the
//! confirmed UTXO set and (optionally) the pool are captured together in a
//! [`Snapshot`](state::Snapshot), so an answer can never mix state from two
//! different blocks.
//!
//! # Endpoints
//!
//! - `GET /query/utxos[/checkmempool]/<txid>-<n>[/<txid>-<n>...].<json|bin|hex>`
//! - `POST /query/utxos.<json|bin|hex>` with the query in the body
//! - `GET /query/tx/<txid>.<json|bin|hex>`
//!
//! At most [`MAX_GETUTXOS_OUTPOINTS`] outpoints may be queried at once.
//!
//! # Usage
//!
#![cfg_attr(not(feature = "use-reqwest"), doc = "```ignore")]
#![cfg_attr(feature = "use-reqwest", doc = "```rust")]
//! use utxo_query::prelude::*;
//!
//! async fn still_unspent(outpoint: OutPoint) -> Result<bool, Error> {
//!     let rest = RestClient::network_default(Network::Bitcoin)?;
//!     let result = rest.get_utxos(&[outpoint], true).await?;
//!     Ok(result.bitmap[0])
//! }
//!
//! ```
//!
//! Serving an in-memory [`NodeState`](state::NodeState):
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use utxo_query::{config::ServerConfig, server::{AppState, QueryServer}, state::NodeState};
//!
//! # async fn run() -> std::io::Result<()> {
//! let config = ServerConfig::from_env().expect("valid configuration");
//! let node = Arc::new(NodeState::new());
//! let server = QueryServer::new(AppState::from_node(node, &config), config);
//! server.start(std::future::pending()).await
//! # }
//! ```
//!
//! # Features
//!
//! By default, this library includes a struct `RestClient` which implements
//! `RestApi` by using the `reqwest` library. To not use `reqwest` as a dependency
//! and implement your own version of `RestApi`, set `default-features = false` in
//! your `Cargo.toml` and implement the `get_json`, `get_bin` and `post_bin`
//! methods with your own http functionality.
//!
pub mod config;
/// Error types for the service and the client.
pub mod error;
pub mod request;
pub mod resolver;
pub mod responses;
pub mod server;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_utils;

/// Prelude includes RestClient and RestApi, and all parameter and return types
pub mod prelude {
    #[cfg(feature = "use-reqwest")]
    pub use super::RestClient;
    pub use super::{
        responses::GetUtxosResult,
        types::{ChainTip, Query, QueryResult, UnspentRecord},
        Error, RestApi,
    };
    pub use bitcoin::{BlockHash, Network, OutPoint, Transaction, Txid};
}

#[doc(inline)]
pub use crate::error::{Error, QueryError};
pub use crate::types::MAX_GETUTXOS_OUTPOINTS;

use crate::request::{encode_binary_form, encode_path_form, RestFormat};
use crate::responses::{decode_utxos_bin, GetUtxosResult};
use crate::types::{Query, QueryResult};

#[cfg(feature = "use-reqwest")]
use bitcoin::Network;
use bitcoin::{consensus::encode::deserialize, OutPoint, Transaction, Txid};
use bytes::Bytes;
#[cfg(feature = "use-reqwest")]
use http::StatusCode;
#[cfg(feature = "use-reqwest")]
use reqwest::{Client, IntoUrl};
use serde::Deserialize;
#[cfg(feature = "use-reqwest")]
use url::Url;

#[doc(hidden)]
#[cfg(not(feature = "use-reqwest"))]
pub use async_trait;
#[doc(hidden)]
#[cfg(not(feature = "use-reqwest"))]
pub use bitcoin;
#[doc(hidden)]
#[cfg(not(feature = "use-reqwest"))]
pub use bytes;
#[doc(hidden)]
#[cfg(not(feature = "use-reqwest"))]
pub use http;
#[doc(hidden)]
#[cfg(not(feature = "use-reqwest"))]
pub use serde;

/// Implements the query calls, except [`get_json`](RestApi::get_json),
/// [`get_bin`](RestApi::get_bin) and [`post_bin`](RestApi::post_bin).
///
/// These are implemented using [`reqwest`](reqwest) in
/// [`RestClient`](RestClient), but this dependency can be removed by using
/// `default-features = false` in `Cargo.toml` and implementing `RestApi`
/// yourself.
#[async_trait::async_trait]
pub trait RestApi {
    /// Get a response from a `json` endpoint
    async fn get_json<T: for<'a> Deserialize<'a>>(&self, path: &str) -> Result<T, Error>;

    /// Get a response from a `bin` endpoint
    async fn get_bin(&self, path: &str) -> Result<Bytes, Error>;

    /// Post `body` to a `bin` endpoint
    async fn post_bin(&self, path: &str, body: Vec<u8>) -> Result<Bytes, Error>;

    /// Get a transaction from the pool or the chain by its `txid`
    async fn get_transaction(&self, txid: Txid) -> Result<Transaction, Error> {
        let path = format!("query/tx/{txid}.bin");
        let resp = self.get_bin(&path).await?;
        Ok(deserialize(&resp)?)
    }

    /// Get utxos for a given set of outpoints
    ///
    /// Optionally check unconfirmed utxos in the pool
    async fn get_utxos(
        &self,
        outpoints: &[OutPoint],
        check_mempool: bool,
    ) -> Result<QueryResult, Error> {
        let path = utxos_path(outpoints, check_mempool, RestFormat::Bin);
        let resp = self.get_bin(&path).await?;
        decode_utxos_bin(&resp, outpoints.len())
    }

    /// Same as [`get_utxos`](RestApi::get_utxos), using the `json` endpoint
    async fn get_utxos_json(
        &self,
        outpoints: &[OutPoint],
        check_mempool: bool,
    ) -> Result<GetUtxosResult, Error> {
        let path = utxos_path(outpoints, check_mempool, RestFormat::Json);
        self.get_json(&path).await
    }

    /// Same as [`get_utxos`](RestApi::get_utxos), with the outpoints sent in
    /// a binary request body
    async fn post_utxos(
        &self,
        outpoints: &[OutPoint],
        check_mempool: bool,
    ) -> Result<QueryResult, Error> {
        let body = encode_binary_form(&Query::new(outpoints.to_vec(), check_mempool));
        let resp = self.post_bin("query/utxos.bin", body).await?;
        decode_utxos_bin(&resp, outpoints.len())
    }
}

fn utxos_path(outpoints: &[OutPoint], check_mempool: bool, format: RestFormat) -> String {
    let query = Query::new(outpoints.to_vec(), check_mempool);
    format!("query/utxos/{}.{}", encode_path_form(&query), format.suffix())
}

/// Creates HTTP REST requests to a query server.
///
/// See [`RestApi`] for the available methods.
#[cfg(feature = "use-reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "use-reqwest")))]
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    endpoint: Url,
}

#[cfg(feature = "use-reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "use-reqwest")))]
impl RestClient {
    /// Create a new `RestClient` instance with given endpoint url
    pub fn new(endpoint: impl IntoUrl) -> Result<Self, Error> {
        Ok(RestClient {
            client: Client::new(),
            endpoint: endpoint.into_url()?,
        })
    }

    /// Create a new `RestClient` instance with the default endpoint for that network
    ///
    /// For example, [`Network::Bitcoin`] creates an instance with `"http://localhost:8332"`
    pub fn network_default(network: Network) -> Result<Self, Error> {
        Self::new(format!(
            "http://localhost:{}",
            config::default_port(network)
        ))
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        self.endpoint
            .join(path)
            .map_err(|e| Error::InvalidResponse(format!("bad request path {path}, {e}")))
    }
}

#[cfg(feature = "use-reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "use-reqwest")))]
#[async_trait::async_trait]
impl RestApi for RestClient {
    async fn get_json<T: for<'a> Deserialize<'a>>(&self, path: &str) -> Result<T, Error> {
        let response = self.client.get(self.url(path)?).send().await?;

        if response.status() != StatusCode::OK {
            return Err(Error::NotOkError(response.status()));
        }

        response.json::<T>().await.map_err(Error::ReqwestError)
    }

    async fn get_bin(&self, path: &str) -> Result<Bytes, Error> {
        let response = self.client.get(self.url(path)?).send().await?;

        if response.status() != StatusCode::OK {
            return Err(Error::NotOkError(response.status()));
        }

        response.bytes().await.map_err(Error::ReqwestError)
    }

    async fn post_bin(&self, path: &str, body: Vec<u8>) -> Result<Bytes, Error> {
        let response = self.client.post(self.url(path)?).body(body).send().await?;

        if response.status() != StatusCode::OK {
            return Err(Error::NotOkError(response.status()));
        }

        response.bytes().await.map_err(Error::ReqwestError)
    }
}

#[cfg(all(test, feature = "use-reqwest"))]
mod tests {
    use std::sync::Arc;

    use super::{Error, RestApi, RestClient, StatusCode};

    use crate::config::ServerConfig;
    use crate::server::{AppState, QueryServer};
    use crate::state::NodeState;
    use crate::test_utils::{block, regtest_node, spend, SUBSIDY};
    use bitcoin::{hashes::Hash, Network, OutPoint, Txid};
    use tokio::net::TcpListener;

    const NUM_BLOCKS: u32 = 101;

    async fn spawn_server(node: Arc<NodeState>) -> RestClient {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let config = ServerConfig::network_default(Network::Regtest);
        let server = QueryServer::new(AppState::from_node(node, &config), config);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener, std::future::pending()).await });
        RestClient::new(format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn test_rest() {
        let (node, coinbases) = regtest_node(NUM_BLOCKS);
        let node = Arc::new(node);
        let rest = spawn_server(node.clone()).await;

        // confirm a payment spending the first coinbase
        let payment = spend(&[coinbases[0]], &[10_000_000, SUBSIDY - 20_000_000]);
        let txid = payment.txid();
        let tip = node.tip().unwrap();
        let tip = node
            .connect_block(&block(tip.hash, NUM_BLOCKS + 1, vec![payment]))
            .unwrap();
        let unspent = OutPoint::new(txid, 0);
        let spent = coinbases[0];

        let tx = rest.get_transaction(txid).await.unwrap();
        assert_eq!(tx.input[0].previous_output, spent);

        let result = rest.get_utxos_json(&[unspent], true).await.unwrap();
        assert_eq!(result.chain_tip_hash, tip.hash);
        assert_eq!(result.utxos.len(), 1);
        assert_eq!(result.utxos[0].value, 10_000_000);

        let result = rest.get_utxos_json(&[spent], true).await.unwrap();
        assert_eq!(result.chain_tip_hash, tip.hash);
        assert_eq!(result.utxos.len(), 0);
        assert_eq!(result.bitmap, "0");

        let result = rest.get_utxos_json(&[unspent, spent], true).await.unwrap();
        assert_eq!(result.utxos.len(), 1);
        assert_eq!(result.bitmap, "10");

        let from_post = rest.post_utxos(&[unspent, spent], true).await.unwrap();
        assert_eq!(from_post.tip.hash, tip.hash);
        assert_eq!(from_post.tip.height, NUM_BLOCKS + 1);
        assert_eq!(from_post, result.into_query_result().unwrap());
        assert_eq!(from_post, rest.get_utxos(&[unspent, spent], true).await.unwrap());

        // a pool transaction only shows up with checkmempool
        let pooled = node
            .add_to_pool(spend(&[OutPoint::new(txid, 1)], &[1_000]))
            .unwrap();
        let pooled = OutPoint::new(pooled, 0);
        let result = rest.get_utxos(&[pooled], false).await.unwrap();
        assert_eq!(result.found.len(), 0);
        let result = rest.get_utxos(&[pooled], true).await.unwrap();
        assert_eq!(result.found.len(), 1);
        assert_eq!(result.found[0].height, 0);
        assert_eq!(rest.get_transaction(pooled.txid).await.unwrap().txid(), pooled.txid);

        // invalid requests
        let client = reqwest::Client::new();
        let base = rest.endpoint.clone();
        for (path, body) in [
            ("query/utxos.json", "{\"checkmempool"),
            ("query/utxos.bin", "{\"checkmempool"),
            ("query/utxos/checkmempool.bin", ""),
        ] {
            let response = client
                .post(base.join(path).unwrap())
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        }

        // limits
        let result = rest.get_utxos(&vec![pooled; 20], true).await;
        match result {
            Err(Error::NotOkError(StatusCode::BAD_REQUEST)) => (),
            Err(_) => panic!(),
            Ok(_) => panic!(),
        }
        let result = rest.get_utxos(&vec![pooled; 15], true).await.unwrap();
        assert_eq!(result.bitmap, vec![true; 15]);

        let result = rest.get_transaction(Txid::all_zeros()).await;
        match result {
            Err(Error::NotOkError(StatusCode::NOT_FOUND)) => (),
            Err(_) => panic!(),
            Ok(_) => panic!(),
        }
    }
}
