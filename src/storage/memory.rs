use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::crypto::Address;
use crate::error::NodeResult;
use crate::types::{Block, BlockAccount, Hash, Transaction};

use super::{Batch, Store};

enum PendingWrite {
    Account(BlockAccount),
    Block(Block),
    Transaction(Hash, Transaction),
    PendingPut(Hash, Transaction),
    PendingRemove(Hash),
    AccountTransactionIndex(Address, Hash),
    AccountOperationIndex(Address, Hash),
}

#[derive(Default)]
struct MemoryBatch {
    writes: Vec<PendingWrite>,
}

impl Batch for MemoryBatch {
    fn put_account(&mut self, account: &BlockAccount) -> NodeResult<()> {
        self.writes.push(PendingWrite::Account(account.clone()));
        Ok(())
    }

    fn put_block(&mut self, block: &Block) -> NodeResult<()> {
        self.writes.push(PendingWrite::Block(block.clone()));
        Ok(())
    }

    fn put_block_transaction(&mut self, hash: &Hash, tx: &Transaction) -> NodeResult<()> {
        self.writes.push(PendingWrite::Transaction(*hash, tx.clone()));
        Ok(())
    }

    fn put_pending_transaction(&mut self, tx: &Transaction) -> NodeResult<()> {
        self.writes.push(PendingWrite::PendingPut(tx.hash(), tx.clone()));
        Ok(())
    }

    fn remove_pending_transaction(&mut self, hash: &Hash) -> NodeResult<()> {
        self.writes.push(PendingWrite::PendingRemove(*hash));
        Ok(())
    }

    fn append_account_transaction_index(&mut self, address: &Address, hash: &Hash) -> NodeResult<()> {
        self.writes.push(PendingWrite::AccountTransactionIndex(*address, *hash));
        Ok(())
    }

    fn append_account_operation_index(&mut self, address: &Address, hash: &Hash) -> NodeResult<()> {
        self.writes.push(PendingWrite::AccountOperationIndex(*address, *hash));
        Ok(())
    }

    fn as_any_box(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
}

/// Volatile `Store` implementation backed by in-process maps, used by tests and the
/// `--storage-path memory` config option.
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<Address, BlockAccount>,
    blocks_by_hash: DashMap<Hash, Block>,
    blocks_by_height: DashMap<u64, Hash>,
    transactions: DashMap<Hash, Transaction>,
    pending: DashMap<Hash, Transaction>,
    account_transaction_index: DashMap<Address, Vec<Hash>>,
    account_operation_index: DashMap<Address, Vec<Hash>>,
    latest_height: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get_account(&self, address: &Address) -> NodeResult<Option<BlockAccount>> {
        Ok(self.accounts.get(address).map(|entry| entry.value().clone()))
    }

    fn get_block_by_hash(&self, hash: &Hash) -> NodeResult<Option<Block>> {
        Ok(self.blocks_by_hash.get(hash).map(|entry| entry.value().clone()))
    }

    fn block_at_height(&self, height: u64) -> NodeResult<Option<Block>> {
        let Some(hash) = self.blocks_by_height.get(&height).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.get_block_by_hash(&hash)
    }

    fn latest_height(&self) -> NodeResult<u64> {
        Ok(self.latest_height.load(Ordering::SeqCst))
    }

    fn get_block_transaction(&self, hash: &Hash) -> NodeResult<Option<Transaction>> {
        Ok(self.transactions.get(hash).map(|entry| entry.value().clone()))
    }

    fn get_pending_transaction(&self, hash: &Hash) -> NodeResult<Option<Transaction>> {
        Ok(self.pending.get(hash).map(|entry| entry.value().clone()))
    }

    fn get_account_transaction_hashes(&self, address: &Address) -> NodeResult<Vec<Hash>> {
        Ok(self
            .account_transaction_index
            .get(address)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn get_account_operation_hashes(&self, address: &Address) -> NodeResult<Vec<Hash>> {
        Ok(self
            .account_operation_index
            .get(address)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(MemoryBatch::default())
    }

    fn commit(&self, batch: Box<dyn Batch>) -> NodeResult<()> {
        let batch = batch
            .as_any_box()
            .downcast::<MemoryBatch>()
            .expect("MemoryStore::commit given a batch from a different Store implementation");
        for write in batch.writes {
            match write {
                PendingWrite::Account(account) => {
                    self.accounts.insert(account.address, account);
                }
                PendingWrite::Block(block) => {
                    let height = block.height;
                    let hash = block.hash;
                    self.blocks_by_hash.insert(hash, block);
                    self.blocks_by_height.insert(height, hash);
                    self.latest_height.fetch_max(height, Ordering::SeqCst);
                }
                PendingWrite::Transaction(hash, tx) => {
                    self.transactions.insert(hash, tx);
                }
                PendingWrite::PendingPut(hash, tx) => {
                    self.pending.insert(hash, tx);
                }
                PendingWrite::PendingRemove(hash) => {
                    self.pending.remove(&hash);
                }
                PendingWrite::AccountTransactionIndex(address, hash) => {
                    self.account_transaction_index.entry(address).or_default().push(hash);
                }
                PendingWrite::AccountOperationIndex(address, hash) => {
                    self.account_operation_index.entry(address).or_default().push(hash);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Round;

    #[test]
    fn commit_makes_block_and_accounts_visible_together() {
        let store = MemoryStore::new();
        let address = {
            let mut rng = rand_core::OsRng;
            crate::crypto::KeyPair::generate(&mut rng).address()
        };
        let account = BlockAccount::new(address, crate::types::Amount::from_gon(1_000), None);
        let block = Block::new(Round::genesis(), address, vec![], Hash::zero(), 0);

        let mut batch = store.new_batch();
        batch.put_account(&account).unwrap();
        batch.put_block(&block).unwrap();
        store.commit(batch).unwrap();

        assert!(store.get_account(&address).unwrap().is_some());
        assert_eq!(store.latest_height().unwrap(), 1);
    }
}
