use std::net::{Ipv4Addr, SocketAddr};

use bitcoin::Network;

use crate::types::MAX_GETUTXOS_OUTPOINTS;

/// Default REST port for `network`, e.g. 8332 for [`Network::Bitcoin`].
pub fn default_port(network: Network) -> u16 {
    match network {
        Network::Testnet => 18332,
        Network::Signet => 38332,
        Network::Regtest => 18443,
        _ => 8332,
    }
}

/// Settings for the query server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub network: Network,
    pub bind_addr: SocketAddr,
    /// Most outpoints accepted in one query.
    pub max_outpoints: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid {var}: {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

impl ServerConfig {
    /// Listen on localhost at the default port for `network`.
    pub fn network_default(network: Network) -> Self {
        ServerConfig {
            network,
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, default_port(network))),
            max_outpoints: MAX_GETUTXOS_OUTPOINTS,
        }
    }

    /// Read `UTXO_QUERY_NETWORK`, `UTXO_QUERY_BIND` and
    /// `UTXO_QUERY_MAX_OUTPOINTS`, falling back to the network defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
            value.parse().map_err(|_| ConfigError { var, value })
        }

        let network = match lookup("UTXO_QUERY_NETWORK") {
            Some(value) => parse("UTXO_QUERY_NETWORK", value)?,
            None => Network::Bitcoin,
        };
        let mut config = Self::network_default(network);
        if let Some(value) = lookup("UTXO_QUERY_BIND") {
            config.bind_addr = parse("UTXO_QUERY_BIND", value)?;
        }
        if let Some(value) = lookup("UTXO_QUERY_MAX_OUTPOINTS") {
            config.max_outpoints = parse("UTXO_QUERY_MAX_OUTPOINTS", value)?;
        }
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::network_default(Network::Bitcoin)
    }
}
