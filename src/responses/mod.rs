//! Response types and wire encodings for the query endpoints.

use bitcoin::{consensus::encode::serialize, Transaction};

pub mod get_utxos;

pub use get_utxos::{decode_utxos_bin, encode_utxos_result, GetUtxosResult, Utxo};

/// Consensus bytes of `tx`, as served by `tx/<txid>.bin`
pub fn encode_transaction(tx: &Transaction) -> Vec<u8> {
    serialize(tx)
}

/// Hex body as served by the `.hex` endpoints, newline terminated
pub fn hex_body(bytes: &[u8]) -> String {
    let mut body = hex::encode(bytes);
    body.push('\n');
    body
}
