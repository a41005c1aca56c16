//! ECDSA primitives over secp256k1: keypairs, signatures and addresses.
//!
//! A wallet address is the compressed SEC1 encoding of the public key in
//! hex behind [`ADDRESS_PREFIX`]; that single encoding is used everywhere
//! (hash preimages, signing, verification). Contract addresses wrap a hash
//! behind [`CONTRACT_ADDRESS_PREFIX`] and carry no key.

use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature as EcdsaSignature, SigningKey, VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{ADDRESS_PREFIX, CONTRACT_ADDRESS_PREFIX};

use super::Hash;

/// Size of a compressed SEC1 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Size of a compact ECDSA signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Error types for key, signature and address operations.
#[derive(Error, Debug, Clone)]
pub enum CryptoError {
    #[error("Invalid public key length: expected {PUBLIC_KEY_SIZE}, got {0}")]
    InvalidPublicKeyLength(usize),

    #[error("Invalid signature length: expected {SIGNATURE_SIZE}, got {0}")]
    InvalidSignatureLength(usize),

    /// Failed to parse public key bytes.
    #[error("Failed to parse public key")]
    InvalidPublicKey,

    /// Failed to parse signature bytes.
    #[error("Failed to parse signature")]
    InvalidSignature,

    /// Signature verification failed.
    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hex string: {0}")]
    HexError(String),
}

/// Compressed secp256k1 public key (33 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidPublicKeyLength(slice.len()));
        }
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex).map_err(|e| CryptoError::HexError(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derive the wallet address for this key.
    pub fn to_address(&self) -> Address {
        Address(format!("{}{}", ADDRESS_PREFIX, self.to_hex()))
    }

    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = EcdsaSignature::from_slice(&signature.0)
            .map_err(|_| CryptoError::InvalidSignature)?;
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        PublicKey::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Compact ECDSA signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignatureLength(slice.len()));
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        let bytes = hex::decode(&hex).map_err(serde::de::Error::custom)?;
        Signature::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// ECDSA keypair over secp256k1.
pub struct KeyPair {
    secret: SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = SigningKey::random(&mut OsRng);
        let public = Self::public_of(&secret);
        Self { secret, public }
    }

    fn public_of(secret: &SigningKey) -> PublicKey {
        let point = VerifyingKey::from(secret).to_encoded_point(true);
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(point.as_bytes());
        PublicKey::from_bytes(bytes)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Sign a message, returning the compact signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig: EcdsaSignature = self.secret.sign(message);
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(&sig.to_bytes());
        Signature::from_bytes(bytes)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("secret", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

/// Textual identifier of a wallet or contract on the chain.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Wallet address: prefix + hex of the compressed public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        key.to_address()
    }

    /// Contract address: contract prefix + hex of the given hash.
    pub fn from_hash(hash: &Hash) -> Self {
        Address(format!("{}{}", CONTRACT_ADDRESS_PREFIX, hash.to_hex()))
    }

    /// Parse and validate a textual address of either kind.
    pub fn from_string(value: &str) -> Result<Self, CryptoError> {
        if let Some(hex) = value.strip_prefix(CONTRACT_ADDRESS_PREFIX) {
            let bytes = hex::decode(hex).map_err(|e| CryptoError::HexError(e.to_string()))?;
            if bytes.len() != crate::crypto::HASH_SIZE {
                return Err(CryptoError::InvalidAddress(value.to_string()));
            }
            return Ok(Address(value.to_string()));
        }
        if let Some(hex) = value.strip_prefix(ADDRESS_PREFIX) {
            PublicKey::from_hex(hex)?;
            return Ok(Address(value.to_string()));
        }
        Err(CryptoError::InvalidAddress(value.to_string()))
    }

    pub fn is_contract(&self) -> bool {
        self.0.starts_with(CONTRACT_ADDRESS_PREFIX)
    }

    /// Recover the public key a wallet address encodes.
    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        if self.is_contract() {
            return Err(CryptoError::InvalidAddress(self.0.clone()));
        }
        let hex = self
            .0
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or_else(|| CryptoError::InvalidAddress(self.0.clone()))?;
        PublicKey::from_hex(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
