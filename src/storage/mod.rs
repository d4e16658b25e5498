pub mod memory;
pub mod rocks;

use crate::crypto::Address;
use crate::error::NodeResult;
use crate::types::{Block, BlockAccount, Hash, Transaction};

pub use memory::MemoryStore;
pub use rocks::RocksStore;

/// One-byte key tags, matching the original implementation's key layout exactly
/// so the wire/storage format isn't an invented detail.
pub mod tags {
    pub const META_LATEST_HEIGHT: u8 = 0x01;
    pub const BLOCK_BY_HASH: u8 = 0x00;
    pub const BLOCK_BY_HEIGHT: u8 = 0x02;
    pub const BLOCK_TRANSACTION: u8 = 0x10;
    pub const BLOCK_TRANSACTION_BY_SOURCE: u8 = 0x13;
    pub const BLOCK_OPERATION: u8 = 0x20;
    pub const ACCOUNT: u8 = 0x30;
    pub const ACCOUNT_BY_SEQUENCE: u8 = 0x32;
    pub const PENDING_POOL: u8 = 0x40;
}

pub fn account_key(address: &Address) -> Vec<u8> {
    let mut key = vec![tags::ACCOUNT];
    key.extend_from_slice(address.as_bytes());
    key
}

pub fn block_by_hash_key(hash: &Hash) -> Vec<u8> {
    let mut key = vec![tags::BLOCK_BY_HASH];
    key.extend_from_slice(hash.as_bytes());
    key
}

pub fn block_by_height_key(height: u64) -> Vec<u8> {
    let mut key = vec![tags::BLOCK_BY_HEIGHT];
    key.extend_from_slice(&height.to_be_bytes());
    key
}

pub fn block_transaction_key(hash: &Hash) -> Vec<u8> {
    let mut key = vec![tags::BLOCK_TRANSACTION];
    key.extend_from_slice(hash.as_bytes());
    key
}

pub fn pending_key(hash: &Hash) -> Vec<u8> {
    let mut key = vec![tags::PENDING_POOL];
    key.extend_from_slice(hash.as_bytes());
    key
}

pub fn account_transaction_index_key(address: &Address) -> Vec<u8> {
    let mut key = vec![tags::BLOCK_TRANSACTION_BY_SOURCE];
    key.extend_from_slice(address.as_bytes());
    key
}

pub fn account_operation_index_key(address: &Address) -> Vec<u8> {
    let mut key = vec![tags::BLOCK_OPERATION];
    key.extend_from_slice(address.as_bytes());
    key
}

/// Ordered key-value storage abstraction over either backend. Every
/// mutation that must be atomic with a block commit goes through `Batch`.
pub trait Store: Send + Sync {
    fn get_account(&self, address: &Address) -> NodeResult<Option<BlockAccount>>;
    fn get_block_by_hash(&self, hash: &Hash) -> NodeResult<Option<Block>>;
    fn block_at_height(&self, height: u64) -> NodeResult<Option<Block>>;
    fn latest_height(&self) -> NodeResult<u64>;
    fn get_block_transaction(&self, hash: &Hash) -> NodeResult<Option<Transaction>>;
    /// A transaction persisted to the durable pending pool, used as a fallback when
    /// the in-memory pool no longer has it (e.g. after a restart).
    fn get_pending_transaction(&self, hash: &Hash) -> NodeResult<Option<Transaction>>;
    /// Hashes of every committed transaction sourced from `address`, oldest first.
    fn get_account_transaction_hashes(&self, address: &Address) -> NodeResult<Vec<Hash>>;
    /// Hashes of every committed transaction carrying an operation that targets `address`.
    fn get_account_operation_hashes(&self, address: &Address) -> NodeResult<Vec<Hash>>;

    fn new_batch(&self) -> Box<dyn Batch>;
    fn commit(&self, batch: Box<dyn Batch>) -> NodeResult<()>;
}

/// An atomic group of writes, applied together by `Store::commit`.
pub trait Batch: Send {
    fn put_account(&mut self, account: &BlockAccount) -> NodeResult<()>;
    fn put_block(&mut self, block: &Block) -> NodeResult<()>;
    fn put_block_transaction(&mut self, hash: &Hash, tx: &Transaction) -> NodeResult<()>;
    fn put_pending_transaction(&mut self, tx: &Transaction) -> NodeResult<()>;
    fn remove_pending_transaction(&mut self, hash: &Hash) -> NodeResult<()>;
    fn append_account_transaction_index(&mut self, address: &Address, hash: &Hash) -> NodeResult<()>;
    fn append_account_operation_index(&mut self, address: &Address, hash: &Hash) -> NodeResult<()>;

    /// Upcast for `Store::commit` to downcast back to its own concrete batch type.
    /// Each `Store` implementation only ever receives batches it created itself.
    fn as_any_box(self: Box<Self>) -> Box<dyn std::any::Any>;
}
