use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::NodeError;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Parse a 64-character lowercase hex string into a hash.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        let bytes = hex::decode(s).map_err(|_| NodeError::BadRequest(format!("invalid hash: {}", s)))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::BadRequest(format!("invalid hash: {}", s)))?;
        Ok(Self(arr))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let result = hasher.finalize();
        let mut array = [0u8; 32];
        array.copy_from_slice(&result[..32]);
        Self(array)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(Hash::from_bytes(b"abc"), Hash::from_bytes(b"abc"));
        assert_ne!(Hash::from_bytes(b"abc"), Hash::from_bytes(b"abd"));
    }
}
