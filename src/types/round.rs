use serde::{Deserialize, Serialize};

use crate::types::Hash;

/// Identifies the block position a ballot is voting on: the height being built and which
/// attempt (`number`) at that height this is, after a prior attempt expired or was rejected.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct Round {
    pub height: u64,
    pub number: u64,
    pub previous_block_hash: Hash,
}

impl Round {
    pub fn new(height: u64, number: u64, previous_block_hash: Hash) -> Self {
        Self {
            height,
            number,
            previous_block_hash,
        }
    }

    pub fn genesis() -> Self {
        Self {
            height: 1,
            number: 0,
            previous_block_hash: Hash::zero(),
        }
    }

    /// The round that follows a committed block at this round's height.
    pub fn next(&self, committed_block_hash: Hash) -> Self {
        Self {
            height: self.height + 1,
            number: 0,
            previous_block_hash: committed_block_hash,
        }
    }

    /// Another attempt at the same height after this round's ballot did not close.
    pub fn retry(&self) -> Self {
        Self {
            height: self.height,
            number: self.number + 1,
            previous_block_hash: self.previous_block_hash,
        }
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.height, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_keeps_height_and_previous_hash() {
        let r = Round::new(5, 0, Hash::from_bytes(b"prev"));
        let retried = r.retry();
        assert_eq!(retried.height, 5);
        assert_eq!(retried.number, 1);
        assert_eq!(retried.previous_block_hash, r.previous_block_hash);
    }

    #[test]
    fn next_advances_height_and_resets_number() {
        let r = Round::new(5, 2, Hash::from_bytes(b"prev"));
        let committed = Hash::from_bytes(b"block-5");
        let n = r.next(committed);
        assert_eq!(n.height, 6);
        assert_eq!(n.number, 0);
        assert_eq!(n.previous_block_hash, committed);
    }
}
