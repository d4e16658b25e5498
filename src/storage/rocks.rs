use std::path::Path;

use rocksdb::{WriteBatch, DB};

use crate::crypto::Address;
use crate::error::{NodeError, NodeResult};
use crate::types::{Block, BlockAccount, Hash, Transaction};

use super::{
    account_key, account_operation_index_key, account_transaction_index_key, block_by_hash_key, block_by_height_key,
    block_transaction_key, pending_key, tags, Batch, Store,
};

/// Persistent `Store` implementation backed by RocksDB.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    pub fn open(path: impl AsRef<Path>) -> NodeResult<Self> {
        let db = DB::open_default(path)?;
        Ok(Self { db })
    }

    fn get_decoded<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> NodeResult<Option<T>> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct RocksBatch {
    inner: WriteBatch,
    /// (address, hash) pairs to append, resolved against the live DB at commit time
    /// since `WriteBatch` itself has no read access.
    pending_tx_index: Vec<(Address, Hash)>,
    pending_op_index: Vec<(Address, Hash)>,
}

impl Batch for RocksBatch {
    fn put_account(&mut self, account: &BlockAccount) -> NodeResult<()> {
        let key = account_key(&account.address);
        let value = bincode::serialize(account)?;
        self.inner.put(key, value);
        Ok(())
    }

    fn put_block(&mut self, block: &Block) -> NodeResult<()> {
        let value = bincode::serialize(block)?;
        self.inner.put(block_by_hash_key(&block.hash), &value);
        self.inner
            .put(block_by_height_key(block.height), block.hash.as_bytes());
        self.inner
            .put([tags::META_LATEST_HEIGHT], block.height.to_be_bytes());
        Ok(())
    }

    fn put_block_transaction(&mut self, hash: &Hash, tx: &Transaction) -> NodeResult<()> {
        let value = bincode::serialize(tx)?;
        self.inner.put(block_transaction_key(hash), value);
        Ok(())
    }

    fn put_pending_transaction(&mut self, tx: &Transaction) -> NodeResult<()> {
        let value = bincode::serialize(tx)?;
        self.inner.put(pending_key(&tx.hash()), value);
        Ok(())
    }

    fn remove_pending_transaction(&mut self, hash: &Hash) -> NodeResult<()> {
        self.inner.delete(pending_key(hash));
        Ok(())
    }

    fn append_account_transaction_index(&mut self, address: &Address, hash: &Hash) -> NodeResult<()> {
        self.pending_tx_index.push((*address, *hash));
        Ok(())
    }

    fn append_account_operation_index(&mut self, address: &Address, hash: &Hash) -> NodeResult<()> {
        self.pending_op_index.push((*address, *hash));
        Ok(())
    }

    fn as_any_box(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
}

impl Store for RocksStore {
    fn get_account(&self, address: &Address) -> NodeResult<Option<BlockAccount>> {
        self.get_decoded(&account_key(address))
    }

    fn get_block_by_hash(&self, hash: &Hash) -> NodeResult<Option<Block>> {
        self.get_decoded(&block_by_hash_key(hash))
    }

    fn block_at_height(&self, height: u64) -> NodeResult<Option<Block>> {
        let Some(hash_bytes) = self.db.get(block_by_height_key(height))? else {
            return Ok(None);
        };
        let arr: [u8; 32] = hash_bytes
            .as_slice()
            .try_into()
            .map_err(|_| NodeError::StorageCorruption("malformed block-by-height entry".to_string()))?;
        self.get_block_by_hash(&Hash::from(arr))
    }

    fn latest_height(&self) -> NodeResult<u64> {
        match self.db.get([tags::META_LATEST_HEIGHT])? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| NodeError::StorageCorruption("malformed latest-height entry".to_string()))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    fn get_block_transaction(&self, hash: &Hash) -> NodeResult<Option<Transaction>> {
        self.get_decoded(&block_transaction_key(hash))
    }

    fn get_pending_transaction(&self, hash: &Hash) -> NodeResult<Option<Transaction>> {
        self.get_decoded(&pending_key(hash))
    }

    fn get_account_transaction_hashes(&self, address: &Address) -> NodeResult<Vec<Hash>> {
        Ok(self
            .get_decoded(&account_transaction_index_key(address))?
            .unwrap_or_default())
    }

    fn get_account_operation_hashes(&self, address: &Address) -> NodeResult<Vec<Hash>> {
        Ok(self
            .get_decoded(&account_operation_index_key(address))?
            .unwrap_or_default())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(RocksBatch::default())
    }

    fn commit(&self, batch: Box<dyn Batch>) -> NodeResult<()> {
        let mut batch = batch
            .as_any_box()
            .downcast::<RocksBatch>()
            .expect("RocksStore::commit given a batch from a different Store implementation");

        for (address, hash) in batch.pending_tx_index.drain(..) {
            let key = account_transaction_index_key(&address);
            let mut hashes: Vec<Hash> = self.get_decoded(&key)?.unwrap_or_default();
            hashes.push(hash);
            batch.inner.put(key, bincode::serialize(&hashes)?);
        }
        for (address, hash) in batch.pending_op_index.drain(..) {
            let key = account_operation_index_key(&address);
            let mut hashes: Vec<Hash> = self.get_decoded(&key)?.unwrap_or_default();
            hashes.push(hash);
            batch.inner.put(key, bincode::serialize(&hashes)?);
        }

        self.db.write(batch.inner)?;
        Ok(())
    }
}
