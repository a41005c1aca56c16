pub mod hash;
pub mod keys;
pub mod random;

pub use hash::{hash, sha256_parts, Hash, HASH_SIZE};
pub use keys::{Address, CryptoError, KeyPair, PublicKey, Signature};
