use crate::state::Snapshot;
use crate::types::{Query, QueryResult};

/// Resolve every outpoint of `query` against `snapshot`.
///
/// Without the pool an outpoint is present iff it is in the confirmed set.
/// With the pool it is present iff it is confirmed and not spent by a pool
/// transaction, or it was created by a pool transaction; the pool record wins
/// when both exist. Unknown outpoints simply resolve to absent.
pub fn resolve(query: &Query, snapshot: &Snapshot) -> QueryResult {
    let mut bitmap = Vec::with_capacity(query.outpoints.len());
    let mut found = Vec::new();

    for outpoint in &query.outpoints {
        let record = if query.check_mempool {
            snapshot.pooled(outpoint).or_else(|| {
                snapshot
                    .confirmed(outpoint)
                    .filter(|_| !snapshot.is_pool_spent(outpoint))
            })
        } else {
            snapshot.confirmed(outpoint)
        };

        bitmap.push(record.is_some());
        if let Some(record) = record {
            found.push(record.clone());
        }
    }

    QueryResult {
        tip: snapshot.tip(),
        bitmap,
        found,
    }
}
