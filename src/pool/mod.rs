use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{NodeError, NodeResult};
use crate::types::{Hash, Transaction};

/// Holds transactions waiting to be proposed or already proposed but not yet
/// finalized. A transaction stays in the pool, marked "proposed", while its round is
/// in flight; a `NO` or `EXPIRED` outcome unmarks it so a later round can propose it
/// again, and only a committed block actually evicts it.
pub struct TransactionPool {
    transactions: DashMap<Hash, Transaction>,
    proposed: DashMap<Hash, ()>,
    order: Mutex<VecDeque<Hash>>,
    max_size: usize,
}

impl TransactionPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            transactions: DashMap::new(),
            proposed: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.transactions.get(hash).map(|entry| entry.value().clone())
    }

    /// Admit a new transaction. Rejects a transaction whose hash is already present
    /// and rejects admission once
    /// the pool is at capacity.
    pub fn insert(&self, tx: Transaction) -> NodeResult<()> {
        let hash = tx.hash();
        if self.transactions.contains_key(&hash) {
            return Err(NodeError::AlreadySaved);
        }
        if self.transactions.len() >= self.max_size {
            return Err(NodeError::Storage("transaction pool is full".to_string()));
        }
        self.transactions.insert(hash, tx);
        self.order.lock().push_back(hash);
        Ok(())
    }

    /// Select up to `max` unproposed transactions, in admission order, and mark them
    /// proposed. Marked transactions are skipped by future calls until unmarked.
    pub fn propose_batch(&self, max: usize) -> Vec<Transaction> {
        let mut order = self.order.lock();
        let mut chosen = Vec::with_capacity(max);
        let mut requeue = VecDeque::new();

        while let Some(hash) = order.pop_front() {
            let Some(entry) = self.transactions.get(&hash) else {
                continue;
            };
            if self.proposed.contains_key(&hash) {
                requeue.push_back(hash);
                continue;
            }
            chosen.push(entry.value().clone());
            self.proposed.insert(hash, ());
            requeue.push_back(hash);
            if chosen.len() >= max {
                break;
            }
        }
        requeue.extend(order.drain(..));
        *order = requeue;
        chosen
    }

    /// Return proposed transactions to availability after their round aborted
    /// (`NO`/`EXPIRED`), without removing them from the pool.
    pub fn unmark_proposed(&self, hashes: &[Hash]) {
        for hash in hashes {
            self.proposed.remove(hash);
        }
    }

    /// Permanently evict transactions that were just committed into a block.
    pub fn remove_committed(&self, hashes: &[Hash]) {
        for hash in hashes {
            self.transactions.remove(hash);
            self.proposed.remove(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::Amount;

    fn tx(seq: u64) -> Transaction {
        let kp = KeyPair::generate(&mut rand_core::OsRng);
        Transaction::new_signed(&kp, b"net", Amount::from_gon(10_000), seq, vec![])
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let pool = TransactionPool::new(10);
        let t = tx(1);
        pool.insert(t.clone()).unwrap();
        assert!(matches!(pool.insert(t), Err(NodeError::AlreadySaved)));
    }

    #[test]
    fn propose_batch_skips_already_marked() {
        let pool = TransactionPool::new(10);
        let a = tx(1);
        let b = tx(2);
        pool.insert(a.clone()).unwrap();
        pool.insert(b.clone()).unwrap();

        let first_batch = pool.propose_batch(1);
        assert_eq!(first_batch.len(), 1);
        assert_eq!(first_batch[0].hash(), a.hash());

        let second_batch = pool.propose_batch(1);
        assert_eq!(second_batch.len(), 1);
        assert_eq!(second_batch[0].hash(), b.hash());
    }

    #[test]
    fn unmark_returns_transaction_for_reproposal() {
        let pool = TransactionPool::new(10);
        let a = tx(1);
        pool.insert(a.clone()).unwrap();
        let batch = pool.propose_batch(5);
        assert_eq!(batch.len(), 1);
        pool.unmark_proposed(&[a.hash()]);
        let batch_again = pool.propose_batch(5);
        assert_eq!(batch_again.len(), 1);
        assert_eq!(batch_again[0].hash(), a.hash());
    }

    #[test]
    fn remove_committed_evicts_permanently() {
        let pool = TransactionPool::new(10);
        let a = tx(1);
        pool.insert(a.clone()).unwrap();
        pool.propose_batch(5);
        pool.remove_committed(&[a.hash()]);
        assert!(!pool.contains(&a.hash()));
    }
}
