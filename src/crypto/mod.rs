//! Ed25519 keypairs and base58-encoded addresses.
//!
//! The consensus core treats these as assumed primitives; this module supplies
//! a real implementation rather than a placeholder, since the node has to actually sign
//! and verify ballots and transactions.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

const ADDRESS_PREFIX: &str = "G";

#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let signing_key = SigningKey::generate(rng);
        Self { signing_key }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.signing_key.verifying_key())
    }

    /// Sign `networkID ∥ message` and return the raw 64-byte signature.
    pub fn sign_with_network_id(&self, network_id: &[u8], message: &[u8]) -> Signature {
        let mut payload = Vec::with_capacity(network_id.len() + message.len());
        payload.extend_from_slice(network_id);
        payload.extend_from_slice(message);
        let sig: DalekSignature = self.signing_key.sign(&payload);
        Signature(sig.to_bytes().to_vec())
    }
}

/// A base58-encoded Ed25519 public key, used as the canonical validator/account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, PartialOrd, Ord)]
pub struct Address(#[serde(with = "address_serde")] [u8; 32]);

mod address_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::Address(*bytes).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        super::Address::parse(&s)
            .map(|a| a.0)
            .map_err(serde::de::Error::custom)
    }
}

impl Address {
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    /// Parse a base58 address string of the form `G<base58(32 raw bytes)>`.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        let body = s
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or_else(|| NodeError::BadPublicAddress(s.to_string()))?;
        let bytes = bs58::decode(body)
            .into_vec()
            .map_err(|_| NodeError::BadPublicAddress(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::BadPublicAddress(s.to_string()))?;
        Ok(Self(arr))
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, NodeError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| NodeError::BadPublicAddress(self.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", ADDRESS_PREFIX, bs58::encode(&self.0).into_string())
    }
}

/// A detached Ed25519 signature.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Verify `networkID ∥ message` against `address` under this signature.
    pub fn verify(
        &self,
        address: &Address,
        network_id: &[u8],
        message: &[u8],
    ) -> Result<(), NodeError> {
        let key = address.verifying_key()?;
        let sig_bytes: [u8; 64] = self
            .0
            .as_slice()
            .try_into()
            .map_err(|_| NodeError::BadSignature)?;
        let sig = DalekSignature::from_bytes(&sig_bytes);

        let mut payload = Vec::with_capacity(network_id.len() + message.len());
        payload.extend_from_slice(network_id);
        payload.extend_from_slice(message);

        key.verify(&payload, &sig).map_err(|_| NodeError::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrips_through_display_and_parse() {
        let mut rng = rand_core::OsRng;
        let kp = KeyPair::generate(&mut rng);
        let addr = kp.address();
        let parsed = Address::parse(&addr.to_string()).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let mut rng = rand_core::OsRng;
        let kp = KeyPair::generate(&mut rng);
        let network_id = b"test-network";
        let message = b"hello ballot";

        let sig = kp.sign_with_network_id(network_id, message);
        assert!(sig.verify(&kp.address(), network_id, message).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let mut rng = rand_core::OsRng;
        let kp = KeyPair::generate(&mut rng);
        let network_id = b"test-network";
        let sig = kp.sign_with_network_id(network_id, b"hello ballot");
        assert!(sig.verify(&kp.address(), network_id, b"goodbye ballot").is_err());
    }
}
