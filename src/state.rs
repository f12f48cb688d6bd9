//! Confirmed chain state, the transaction pool, and point-in-time snapshots of both.
//!
//! Both stores are copy-on-write: each lives in an [`Arc`] behind a
//! [`parking_lot::RwLock`]. Capturing a [`Snapshot`] clones the `Arc`s while
//! holding the read locks, so the locks are held only for the capture and a
//! snapshot never observes a half-applied block or pool update. Writers call
//! [`Arc::make_mut`], which copies a store only while a snapshot still holds it.
//!
//! Confirmed transactions are indexed outside the snapshot value, so a live
//! snapshot never makes block acceptance copy the transaction history.
//!
//! Locks are always taken chain first, then pool, then the transaction index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bitcoin::{Block, OutPoint, Transaction, Txid};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::QueryError;
use crate::types::{is_coinbase, ChainTip, UnspentRecord};

/// Produces consistent snapshots of chain and pool state.
pub trait SnapshotProvider: Send + Sync {
    /// Capture the current tip and unspent outputs. The pool is consulted only
    /// when `check_mempool` is set.
    fn capture(&self, check_mempool: bool) -> Result<Snapshot, QueryError>;
}

/// Looks up full transactions by id.
pub trait TransactionSource: Send + Sync {
    fn transaction(&self, txid: &Txid) -> Result<Option<Transaction>, QueryError>;
}

#[derive(Clone, Default, Debug)]
struct ChainStore {
    tip: Option<ChainTip>,
    coins: HashMap<OutPoint, UnspentRecord>,
}

#[derive(Clone, Default, Debug)]
struct PoolStore {
    transactions: HashMap<Txid, Transaction>,
    coins: HashMap<OutPoint, UnspentRecord>,
    /// Outpoint -> pool transaction spending it.
    spent: HashMap<OutPoint, Txid>,
}

impl PoolStore {
    fn contains(&self, txid: &Txid) -> bool {
        self.transactions.contains_key(txid)
    }

    /// Remove one transaction, leaving its descendants in place.
    fn remove_one(&mut self, txid: &Txid) -> Option<Transaction> {
        let tx = self.transactions.remove(txid)?;
        for vout in 0..tx.output.len() as u32 {
            self.coins.remove(&OutPoint::new(*txid, vout));
        }
        for input in &tx.input {
            if self.spent.get(&input.previous_output) == Some(txid) {
                self.spent.remove(&input.previous_output);
            }
        }
        Some(tx)
    }

    /// Remove a transaction and everything in the pool that depends on it.
    fn remove_with_descendants(&mut self, txid: &Txid) -> usize {
        let mut removed = 0;
        let mut pending = vec![*txid];
        while let Some(next) = pending.pop() {
            let Some(tx) = self.remove_one(&next) else {
                continue;
            };
            removed += 1;
            for vout in 0..tx.output.len() as u32 {
                if let Some(child) = self.spent.get(&OutPoint::new(next, vout)) {
                    pending.push(*child);
                }
            }
        }
        removed
    }
}

/// Immutable view of chain and pool state captured at one instant.
#[derive(Clone, Debug)]
pub struct Snapshot {
    tip: ChainTip,
    chain: Arc<ChainStore>,
    pool: Option<Arc<PoolStore>>,
}

impl Snapshot {
    /// Build a snapshot from explicit tables, for providers not backed by
    /// [`NodeState`].
    pub fn new(tip: ChainTip, confirmed: HashMap<OutPoint, UnspentRecord>) -> Self {
        Snapshot {
            tip,
            chain: Arc::new(ChainStore {
                tip: Some(tip),
                coins: confirmed,
            }),
            pool: None,
        }
    }

    /// Attach pool outputs and the outpoints spent by pool transactions,
    /// each paired with the id of its spender.
    pub fn with_pool(
        mut self,
        pooled: HashMap<OutPoint, UnspentRecord>,
        pool_spent: impl IntoIterator<Item = (OutPoint, Txid)>,
    ) -> Self {
        self.pool = Some(Arc::new(PoolStore {
            transactions: HashMap::new(),
            coins: pooled,
            spent: pool_spent.into_iter().collect(),
        }));
        self
    }

    pub fn tip(&self) -> ChainTip {
        self.tip
    }

    pub fn confirmed(&self, outpoint: &OutPoint) -> Option<&UnspentRecord> {
        self.chain.coins.get(outpoint)
    }

    pub fn pooled(&self, outpoint: &OutPoint) -> Option<&UnspentRecord> {
        self.pool.as_ref()?.coins.get(outpoint)
    }

    pub fn is_pool_spent(&self, outpoint: &OutPoint) -> bool {
        self.pool
            .as_ref()
            .is_some_and(|pool| pool.spent.contains_key(outpoint))
    }

    pub fn includes_pool(&self) -> bool {
        self.pool.is_some()
    }
}

/// In-memory node state: the confirmed UTXO set with its tip, and the pool.
#[derive(Default)]
pub struct NodeState {
    chain: RwLock<Arc<ChainStore>>,
    pool: RwLock<Arc<PoolStore>>,
    confirmed_txs: RwLock<HashMap<Txid, Transaction>>,
}

impl NodeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tip(&self) -> Option<ChainTip> {
        self.chain.read().tip
    }

    pub fn pool_size(&self) -> usize {
        self.pool.read().transactions.len()
    }

    /// Accept a block on top of the current tip.
    ///
    /// The first block connected is treated as genesis: it becomes height 0
    /// and its outputs are not spendable. Pool transactions included in the
    /// block are dropped from the pool, and so are pool transactions that
    /// conflict with the block along with their descendants.
    pub fn connect_block(&self, block: &Block) -> Result<ChainTip, QueryError> {
        let mut chain_guard = self.chain.write();
        let mut pool_guard = self.pool.write();

        let hash = block.block_hash();
        let height = match chain_guard.tip {
            None => 0,
            Some(tip) if block.header.prev_blockhash == tip.hash => tip.height + 1,
            Some(_) => return Err(QueryError::OrphanBlock(block.header.prev_blockhash)),
        };
        let mut created = Vec::new();
        let mut block_spends = Vec::new();
        if height > 0 {
            check_block_inputs(&chain_guard, block)?;
            for tx in &block.txdata {
                let txid = tx.txid();
                let coinbase = is_coinbase(tx);
                if !coinbase {
                    block_spends.extend(tx.input.iter().map(|input| (input.previous_output, txid)));
                }
                for (vout, output) in tx.output.iter().enumerate() {
                    let record = UnspentRecord::from_output(output, height, coinbase)?;
                    created.push((OutPoint::new(txid, vout as u32), record));
                }
            }
        }

        // Outputs created and spent within the block are inserted, then removed.
        let chain = Arc::make_mut(&mut *chain_guard);
        chain.coins.extend(created);
        for (outpoint, _) in &block_spends {
            chain.coins.remove(outpoint);
        }
        let tip = ChainTip { hash, height };
        chain.tip = Some(tip);

        let pool = Arc::make_mut(&mut *pool_guard);
        let mut confirmed = 0;
        for tx in &block.txdata {
            if pool.remove_one(&tx.txid()).is_some() {
                confirmed += 1;
            }
        }
        let mut conflicts = 0;
        for (outpoint, spender) in block_spends {
            if let Some(pool_spender) = pool.spent.get(&outpoint).copied() {
                if pool_spender != spender {
                    conflicts += pool.remove_with_descendants(&pool_spender);
                }
            }
        }
        self.confirmed_txs
            .write()
            .extend(block.txdata.iter().map(|tx| (tx.txid(), tx.clone())));

        debug!(
            height,
            %hash,
            txs = block.txdata.len(),
            confirmed,
            conflicts,
            "connected block"
        );
        Ok(tip)
    }

    /// Admit a transaction to the pool. It must have at least one input and
    /// every input must be unspent, either confirmed or created by another
    /// pool transaction.
    pub fn add_to_pool(&self, tx: Transaction) -> Result<Txid, QueryError> {
        let chain = self.chain.read();
        let mut pool_guard = self.pool.write();

        let txid = tx.txid();
        if pool_guard.contains(&txid) || self.confirmed_txs.read().contains_key(&txid) {
            return Ok(txid);
        }
        if tx.input.is_empty() || is_coinbase(&tx) {
            return Err(QueryError::InputUnavailable(OutPoint::null()));
        }
        let mut seen = HashSet::new();
        for input in &tx.input {
            let outpoint = input.previous_output;
            let available = seen.insert(outpoint)
                && !pool_guard.spent.contains_key(&outpoint)
                && (chain.coins.contains_key(&outpoint) || pool_guard.coins.contains_key(&outpoint));
            if !available {
                return Err(QueryError::InputUnavailable(outpoint));
            }
        }

        let created = tx
            .output
            .iter()
            .enumerate()
            .map(|(vout, output)| {
                let record = UnspentRecord::from_output(output, 0, false)?;
                Ok((OutPoint::new(txid, vout as u32), record))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;

        let pool = Arc::make_mut(&mut *pool_guard);
        for input in &tx.input {
            pool.spent.insert(input.previous_output, txid);
        }
        pool.coins.extend(created);
        pool.transactions.insert(txid, tx);
        trace!(%txid, "added transaction to pool");
        Ok(txid)
    }

    /// Drop a pool transaction and its pool descendants. Returns how many
    /// transactions were removed.
    pub fn remove_from_pool(&self, txid: &Txid) -> usize {
        let mut pool_guard = self.pool.write();
        if !pool_guard.contains(txid) {
            return 0;
        }
        Arc::make_mut(&mut *pool_guard).remove_with_descendants(txid)
    }
}

fn check_block_inputs(chain: &ChainStore, block: &Block) -> Result<(), QueryError> {
    let mut created = HashSet::new();
    let mut spent = HashSet::new();
    for tx in &block.txdata {
        if !is_coinbase(tx) {
            for input in &tx.input {
                let outpoint = input.previous_output;
                let exists =
                    chain.coins.contains_key(&outpoint) || created.contains(&outpoint);
                if !exists || !spent.insert(outpoint) {
                    return Err(QueryError::InputUnavailable(outpoint));
                }
            }
        }
        let txid = tx.txid();
        created.extend((0..tx.output.len() as u32).map(|vout| OutPoint::new(txid, vout)));
    }
    Ok(())
}

impl SnapshotProvider for NodeState {
    fn capture(&self, check_mempool: bool) -> Result<Snapshot, QueryError> {
        let chain = self.chain.read();
        let tip = chain.tip.ok_or_else(|| {
            QueryError::StorageUnavailable("chain state has no tip yet".to_string())
        })?;
        let pool = check_mempool.then(|| Arc::clone(&*self.pool.read()));
        Ok(Snapshot {
            tip,
            chain: Arc::clone(&*chain),
            pool,
        })
    }
}

impl TransactionSource for NodeState {
    fn transaction(&self, txid: &Txid) -> Result<Option<Transaction>, QueryError> {
        let pool = self.pool.read();
        if let Some(tx) = self.confirmed_txs.read().get(txid) {
            return Ok(Some(tx.clone()));
        }
        Ok(pool.transactions.get(txid).cloned())
    }
}
