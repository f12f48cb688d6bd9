//! Encodings of a [`QueryResult`].
//!
//! The binary layout, all integers little endian:
//!
//! | field            | size                                    |
//! |------------------|-----------------------------------------|
//! | chain height     | 4                                       |
//! | chain tip hash   | 32, internal byte order                 |
//! | bitmap           | 1 byte (`0`/`1`) per queried outpoint   |
//! | per found utxo   | value (8), script (CompactSize + bytes), height (4), coinbase (1) |
//!
//! The bitmap carries no length, so decoding needs the number of queried
//! outpoints.

use std::io::{Cursor, Read};

use bitcoin::{
    consensus::encode::{serialize, Decodable, ReadExt},
    BlockHash, ScriptBuf, Txid,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{ChainTip, Query, QueryResult, UnspentRecord};

/// Response from `get_utxos` in `json` format
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct GetUtxosResult {
    #[serde(rename = "chainHeight")]
    pub chain_height: u32,
    #[serde(rename = "chaintipHash")]
    pub chain_tip_hash: BlockHash,
    /// `'0'`/`'1'` per queried outpoint
    pub bitmap: String,
    pub utxos: Vec<Utxo>,
}

/// A found output, with its position in the query
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub query_index: u32,
    pub txid: Txid,
    pub vout: u32,
    pub value: i64,
    /// hex encoded
    pub script_pub_key: String,
    pub height: u32,
    pub coinbase: bool,
}

impl GetUtxosResult {
    pub fn new(query: &Query, result: &QueryResult) -> Self {
        let utxos = result
            .found_indices()
            .zip(&result.found)
            .map(|(index, record)| {
                let outpoint = query.outpoints[index];
                Utxo {
                    query_index: index as u32,
                    txid: outpoint.txid,
                    vout: outpoint.vout,
                    value: record.value,
                    script_pub_key: hex::encode(record.script_pubkey.as_bytes()),
                    height: record.height,
                    coinbase: record.is_coinbase,
                }
            })
            .collect();

        GetUtxosResult {
            chain_height: result.tip.height,
            chain_tip_hash: result.tip.hash,
            bitmap: result.bitmap_string(),
            utxos,
        }
    }

    /// Check the response is self-consistent and convert it back.
    pub fn into_query_result(self) -> Result<QueryResult, Error> {
        let bitmap = self
            .bitmap
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(Error::InvalidResponse(format!("bitmap character {other:?}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let indices = bitmap
            .iter()
            .enumerate()
            .filter_map(|(i, present)| present.then_some(i as u32))
            .collect::<Vec<_>>();
        if indices.len() != self.utxos.len() {
            return Err(Error::InvalidResponse(format!(
                "{} bits set but {} utxos",
                indices.len(),
                self.utxos.len()
            )));
        }

        let mut found = Vec::with_capacity(self.utxos.len());
        for (utxo, index) in self.utxos.into_iter().zip(indices) {
            if utxo.query_index != index {
                return Err(Error::InvalidResponse(format!(
                    "utxo for query index {} where {index} was expected",
                    utxo.query_index
                )));
            }
            let script = hex::decode(&utxo.script_pub_key)
                .map_err(|e| Error::InvalidResponse(format!("script hex, {e}")))?;
            found.push(UnspentRecord {
                value: utxo.value,
                script_pubkey: ScriptBuf::from(script),
                height: utxo.height,
                is_coinbase: utxo.coinbase,
            });
        }

        Ok(QueryResult {
            tip: ChainTip {
                hash: self.chain_tip_hash,
                height: self.chain_height,
            },
            bitmap,
            found,
        })
    }
}

/// Serialize `result` in the `bin` layout.
pub fn encode_utxos_result(result: &QueryResult) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&result.tip.height.to_le_bytes());
    out.extend_from_slice(&serialize(&result.tip.hash));
    out.extend(result.bitmap.iter().map(|present| u8::from(*present)));
    for record in &result.found {
        out.extend_from_slice(&record.value.to_le_bytes());
        out.extend_from_slice(&serialize(&record.script_pubkey));
        out.extend_from_slice(&record.height.to_le_bytes());
        out.push(u8::from(record.is_coinbase));
    }
    out
}

/// Parse a complete `bin` response to a query of `outpoint_count`
/// outpoints, rejecting trailing bytes.
pub fn decode_utxos_bin(bytes: &[u8], outpoint_count: usize) -> Result<QueryResult, Error> {
    let mut cursor = Cursor::new(bytes);
    let result = decode_utxos_result(&mut cursor, outpoint_count)?;
    if cursor.position() as usize != bytes.len() {
        return Err(Error::InvalidResponse(format!(
            "{} trailing bytes",
            bytes.len() - cursor.position() as usize
        )));
    }
    Ok(result)
}

fn decode_utxos_result(
    reader: &mut impl Read,
    outpoint_count: usize,
) -> Result<QueryResult, Error> {
    let height: u32 = Decodable::consensus_decode_from_finite_reader(reader)?;
    let hash: BlockHash = Decodable::consensus_decode_from_finite_reader(reader)?;
    let bitmap = read_bytes(reader, outpoint_count)?
        .into_iter()
        .map(decode_flag)
        .collect::<Result<Vec<_>, _>>()?;

    let utxo_count = bitmap.iter().filter(|present| **present).count();
    let mut found = Vec::with_capacity(utxo_count);
    for _ in 0..utxo_count {
        found.push(decode_utxo(reader)?);
    }

    Ok(QueryResult {
        tip: ChainTip { hash, height },
        bitmap,
        found,
    })
}

fn decode_utxo(reader: &mut impl Read) -> Result<UnspentRecord, Error> {
    Ok(UnspentRecord {
        value: Decodable::consensus_decode_from_finite_reader(reader)?,
        script_pubkey: Decodable::consensus_decode_from_finite_reader(reader)?,
        height: Decodable::consensus_decode_from_finite_reader(reader)?,
        is_coinbase: decode_flag(reader.read_u8()?)?,
    })
}

fn decode_flag(byte: u8) -> Result<bool, Error> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::InvalidResponse(format!("flag byte {other}"))),
    }
}

fn read_bytes(reader: &mut impl Read, num: usize) -> Result<Vec<u8>, Error> {
    let mut ret = Vec::with_capacity(num.min(4096));
    for _ in 0..num {
        ret.push(reader.read_u8()?);
    }
    Ok(ret)
}
