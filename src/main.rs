//! utxo-queryd: serves UTXO queries over an in-memory node state.

use std::process::ExitCode;
use std::sync::Arc;

use bitcoin::blockdata::constants::genesis_block;
use tracing::{error, info};
use utxo_query::{
    config::ServerConfig,
    server::{AppState, QueryServer},
    state::NodeState,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let node = Arc::new(NodeState::new());
    match node.connect_block(&genesis_block(config.network)) {
        Ok(tip) => info!(network = %config.network, hash = %tip.hash, "loaded genesis block"),
        Err(e) => {
            error!("failed to load genesis block: {e}");
            return ExitCode::FAILURE;
        }
    }

    let server = QueryServer::new(AppState::from_node(node, &config), config);
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    };
    if let Err(e) = server.start(shutdown).await {
        error!("server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
