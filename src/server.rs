//! HTTP front end: routes `/query/...` requests to the codecs and the resolver.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::QueryError;
use crate::request::{parse_txid, RawQuery, RestFormat};
use crate::resolver::resolve;
use crate::responses::{encode_transaction, encode_utxos_result, hex_body, GetUtxosResult};
use crate::state::{NodeState, SnapshotProvider, TransactionSource};
use crate::types::{Query, QueryResult};

/// Shared handles every request works from.
#[derive(Clone)]
pub struct AppState {
    snapshots: Arc<dyn SnapshotProvider>,
    transactions: Arc<dyn TransactionSource>,
    max_outpoints: usize,
}

impl AppState {
    pub fn new(
        snapshots: Arc<dyn SnapshotProvider>,
        transactions: Arc<dyn TransactionSource>,
        max_outpoints: usize,
    ) -> Self {
        AppState {
            snapshots,
            transactions,
            max_outpoints,
        }
    }

    pub fn from_node(node: Arc<NodeState>, config: &ServerConfig) -> Self {
        Self::new(node.clone(), node, config.max_outpoints)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query/*path", get(handle_get).post(handle_post))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct QueryServer {
    state: AppState,
    config: ServerConfig,
}

impl QueryServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn start(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        info!(
            addr = %listener.local_addr()?,
            network = %self.config.network,
            max_outpoints = self.config.max_outpoints,
            "query server listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn handle_get(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, QueryError> {
    dispatch(&state, &path, None).map_err(|err| log_failure(&path, err))
}

async fn handle_post(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Response, QueryError> {
    dispatch(&state, &path, Some(&body)).map_err(|err| log_failure(&path, err))
}

fn log_failure(path: &str, err: QueryError) -> QueryError {
    if err.is_client_error() {
        warn!(path, error = %err, "rejected query");
    } else {
        error!(path, error = %err, "query failed");
    }
    err
}

/// Answer one request for `path` (everything after `/query/`). `body` is
/// `None` for GET requests.
pub fn dispatch(state: &AppState, path: &str, body: Option<&[u8]>) -> Result<Response, QueryError> {
    let (stem, format) = RestFormat::split_path(path)?;
    let (endpoint, rest) = match stem.split_once('/') {
        Some((endpoint, rest)) => (endpoint, Some(rest)),
        None => (stem, None),
    };
    match endpoint {
        "utxos" => {
            let segments = rest.map(|rest| rest.split('/').collect()).unwrap_or_default();
            let query = decode_utxos_request(format, segments, body)?;
            let result = run_query(state, &query)?;
            Ok(utxos_response(format, &query, &result))
        }
        "tx" => {
            let txid = parse_txid(rest.unwrap_or_default())?;
            let tx = state
                .transactions
                .transaction(&txid)?
                .ok_or_else(|| QueryError::NotFound(format!("transaction {txid}")))?;
            Ok(match format {
                RestFormat::Json => Json(tx).into_response(),
                RestFormat::Bin => binary_response(encode_transaction(&tx)),
                RestFormat::Hex => hex_response(&encode_transaction(&tx)),
            })
        }
        _ => Err(QueryError::NotFound(path.to_string())),
    }
}

fn decode_utxos_request(
    format: RestFormat,
    segments: Vec<&str>,
    body: Option<&[u8]>,
) -> Result<Query, QueryError> {
    let body = match body {
        Some(body) if !body.is_empty() => body,
        _ => return RawQuery::PathForm(segments).decode(),
    };
    if !segments.is_empty() {
        return Err(QueryError::MalformedReference(
            "outpoints given in both the path and the body".to_string(),
        ));
    }

    match format {
        RestFormat::Bin => RawQuery::BinaryForm(body).decode(),
        RestFormat::Hex => {
            let bytes = hex::decode(body_text(body)?)
                .map_err(|e| QueryError::MalformedReference(format!("hex body, {e}")))?;
            RawQuery::BinaryForm(&bytes).decode()
        }
        RestFormat::Json => RawQuery::from_text(body_text(body)?).decode(),
    }
}

fn body_text(body: &[u8]) -> Result<&str, QueryError> {
    std::str::from_utf8(body)
        .map(str::trim)
        .map_err(|_| QueryError::MalformedReference("body is not valid utf-8".to_string()))
}

fn run_query(state: &AppState, query: &Query) -> Result<QueryResult, QueryError> {
    if query.outpoints.len() > state.max_outpoints {
        return Err(QueryError::BatchTooLarge {
            count: query.outpoints.len(),
            max: state.max_outpoints,
        });
    }
    let snapshot = state.snapshots.capture(query.check_mempool)?;
    let result = resolve(query, &snapshot);
    debug!(
        outpoints = query.outpoints.len(),
        found = result.found.len(),
        check_mempool = query.check_mempool,
        height = result.tip.height,
        "resolved utxo query"
    );
    Ok(result)
}

fn utxos_response(format: RestFormat, query: &Query, result: &QueryResult) -> Response {
    match format {
        RestFormat::Json => Json(GetUtxosResult::new(query, result)).into_response(),
        RestFormat::Bin => binary_response(encode_utxos_result(result)),
        RestFormat::Hex => hex_response(&encode_utxos_result(result)),
    }
}

fn binary_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response()
}

fn hex_response(bytes: &[u8]) -> Response {
    ([(header::CONTENT_TYPE, "text/plain")], hex_body(bytes)).into_response()
}
