//! Chain fixtures for unit and end-to-end tests.

use bitcoin::{
    absolute::LockTime,
    block::{Header, Version},
    blockdata::constants::genesis_block,
    hash_types::TxMerkleNode,
    hashes::Hash,
    Block, BlockHash, CompactTarget, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Witness,
};

use crate::state::NodeState;

pub const SUBSIDY: u64 = 50 * 100_000_000;

pub fn script(tag: u8) -> ScriptBuf {
    ScriptBuf::from(vec![0x51, 0x01, tag])
}

pub fn coinbase(height: u32) -> Transaction {
    Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::from(height.to_le_bytes().to_vec()),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: SUBSIDY,
            script_pubkey: script(0),
        }],
    }
}

pub fn spend(inputs: &[OutPoint], values: &[u64]) -> Transaction {
    Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|previous_output| TxIn {
                previous_output: *previous_output,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: values
            .iter()
            .enumerate()
            .map(|(i, value)| TxOut {
                value: *value,
                script_pubkey: script(i as u8 + 1),
            })
            .collect(),
    }
}

/// A block on top of `prev` carrying a coinbase for `height` followed by `txs`.
pub fn block(prev: BlockHash, height: u32, txs: Vec<Transaction>) -> Block {
    let mut txdata = vec![coinbase(height)];
    txdata.extend(txs);
    Block {
        header: Header {
            version: Version::ONE,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 1_296_688_602 + height,
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce: height,
        },
        txdata,
    }
}

/// Regtest node with genesis plus `blocks` empty blocks. Returns the node and
/// the coinbase outpoint of every non-genesis block, indexed by height - 1.
pub fn regtest_node(blocks: u32) -> (NodeState, Vec<OutPoint>) {
    let node = NodeState::new();
    let mut tip = node
        .connect_block(&genesis_block(Network::Regtest))
        .expect("genesis connects");
    let mut coinbases = Vec::new();
    for height in 1..=blocks {
        let next = block(tip.hash, height, vec![]);
        coinbases.push(OutPoint::new(next.txdata[0].txid(), 0));
        tip = node.connect_block(&next).expect("block connects");
    }
    (node, coinbases)
}
