//! Value types shared by the resolver and the codecs.

use bitcoin::{Amount, BlockHash, OutPoint, ScriptBuf, Transaction, TxOut};

use crate::error::QueryError;

/// Largest number of outpoints accepted in one query.
pub const MAX_GETUTXOS_OUTPOINTS: usize = 15;

/// The most recently accepted block.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct ChainTip {
    pub hash: BlockHash,
    pub height: u32,
}

/// An unspent output together with the context it was created in.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UnspentRecord {
    /// Amount in satoshis.
    pub value: i64,
    pub script_pubkey: ScriptBuf,
    /// Height of the confirming block, 0 for pool-only outputs.
    pub height: u32,
    pub is_coinbase: bool,
}

impl UnspentRecord {
    /// Fails for values above [`Amount::MAX_MONEY`].
    pub fn from_output(
        output: &TxOut,
        height: u32,
        is_coinbase: bool,
    ) -> Result<Self, QueryError> {
        if output.value > Amount::MAX_MONEY.to_sat() {
            return Err(QueryError::ValueOutOfRange(output.value));
        }
        let value =
            i64::try_from(output.value).map_err(|_| QueryError::ValueOutOfRange(output.value))?;
        Ok(UnspentRecord {
            value,
            script_pubkey: output.script_pubkey.clone(),
            height,
            is_coinbase,
        })
    }
}

/// A canonical query, whatever surface form it arrived in.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Query {
    /// Bit positions of the result follow this order.
    pub outpoints: Vec<OutPoint>,
    pub check_mempool: bool,
}

impl Query {
    pub fn new(outpoints: Vec<OutPoint>, check_mempool: bool) -> Self {
        Query {
            outpoints,
            check_mempool,
        }
    }
}

/// Outcome of resolving a [`Query`] against one snapshot.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QueryResult {
    pub tip: ChainTip,
    /// One flag per queried outpoint, in query order.
    pub bitmap: Vec<bool>,
    /// Records for the set bits of `bitmap`, in the same order.
    pub found: Vec<UnspentRecord>,
}

impl QueryResult {
    /// Positions in the original query of the outpoints that were found.
    pub fn found_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bitmap
            .iter()
            .enumerate()
            .filter_map(|(i, present)| present.then_some(i))
    }

    /// The bitmap as a string of `'0'`/`'1'` characters.
    pub fn bitmap_string(&self) -> String {
        self.bitmap
            .iter()
            .map(|present| if *present { '1' } else { '0' })
            .collect()
    }
}

pub(crate) fn is_coinbase(tx: &Transaction) -> bool {
    tx.input.len() == 1 && tx.input[0].previous_output.is_null()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn record(value: i64) -> UnspentRecord {
        UnspentRecord {
            value,
            script_pubkey: ScriptBuf::new(),
            height: 1,
            is_coinbase: false,
        }
    }

    #[test]
    fn bitmap_string_follows_query_order() {
        let result = QueryResult {
            tip: ChainTip {
                hash: BlockHash::all_zeros(),
                height: 0,
            },
            bitmap: vec![true, false, false, true],
            found: vec![record(1), record(2)],
        };
        assert_eq!(result.bitmap_string(), "1001");
        assert_eq!(result.found_indices().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn values_beyond_the_money_supply_are_rejected() {
        let output = |value| TxOut {
            value,
            script_pubkey: ScriptBuf::new(),
        };
        let max = Amount::MAX_MONEY.to_sat();
        assert_eq!(
            UnspentRecord::from_output(&output(max), 1, false).unwrap().value,
            max as i64
        );
        for value in [max + 1, i64::MAX as u64 + 1, u64::MAX] {
            assert_eq!(
                UnspentRecord::from_output(&output(value), 1, false),
                Err(QueryError::ValueOutOfRange(value))
            );
        }
    }
}
