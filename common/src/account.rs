//! Wallets and the lightweight recipient identities derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::crypto::{Address, Hash, KeyPair, PublicKey, Signature};

/// A named keypair. The private key never leaves the wallet; everything
/// that travels on the chain uses the [`Recipient`] identity instead.
pub struct Wallet {
    name: String,
    keypair: KeyPair,
    address: Address,
    // Advisory display cache, the ledger is always authoritative
    balance_cache: AtomicI64,
}

impl Wallet {
    pub fn new(name: &str) -> Self {
        let keypair = KeyPair::generate();
        let address = keypair.public_key().to_address();
        Self {
            name: name.to_string(),
            keypair,
            address,
            balance_cache: AtomicI64::new(0),
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_address(&self) -> &Address {
        &self.address
    }

    pub fn get_public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    /// Sign an already-computed hash.
    pub fn sign_hash(&self, hash: &Hash) -> Signature {
        self.keypair.sign(hash.as_bytes())
    }

    /// The shareable identity of this wallet.
    pub fn recipient(&self) -> Recipient {
        Recipient {
            kind: RecipientKind::Wallet,
            name: self.name.clone(),
            address: self.address.clone(),
            public_key: Some(*self.keypair.public_key()),
        }
    }

    /// Adjust the advisory balance cache, for display only.
    pub fn update_balance(&self, delta: i64) {
        self.balance_cache.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn cached_balance(&self) -> i64 {
        self.balance_cache.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("keypair", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    Wallet,
    Contract,
}

/// Endpoint of a transaction: a wallet or a contract. Cheap to clone,
/// carries no secrets. Two recipients are equal when their addresses are.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recipient {
    kind: RecipientKind,
    name: String,
    address: Address,
    public_key: Option<PublicKey>,
}

impl Recipient {
    /// Identity of a deployed or pending contract.
    pub fn contract(name: &str, address: Address) -> Self {
        Self {
            kind: RecipientKind::Contract,
            name: name.to_string(),
            address,
            public_key: None,
        }
    }

    /// Wallet identity known only by address, e.g. a withdrawal target.
    /// Carries no public key, so it can never pass signature checks.
    pub fn from_address(address: Address) -> Self {
        let name = address.as_str().chars().take(12).collect();
        Self {
            kind: if address.is_contract() {
                RecipientKind::Contract
            } else {
                RecipientKind::Wallet
            },
            name,
            address,
            public_key: None,
        }
    }

    pub fn get_kind(&self) -> RecipientKind {
        self.kind
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_address(&self) -> &Address {
        &self.address
    }

    pub fn get_public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    pub fn is_contract(&self) -> bool {
        matches!(self.kind, RecipientKind::Contract)
    }
}

impl PartialEq for Recipient {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Recipient {}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash;

    #[test]
    fn test_wallet_signs_verifiable_hashes() {
        let wallet = Wallet::new("Alice");
        let h = hash(b"some hash");

        let signature = wallet.sign_hash(&h);
        assert!(wallet
            .get_public_key()
            .verify(h.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn test_recipient_identity() {
        let wallet = Wallet::new("Alice");
        let recipient = wallet.recipient();

        assert_eq!(recipient.get_address(), wallet.get_address());
        assert_eq!(recipient.get_public_key(), Some(wallet.get_public_key()));
        assert!(!recipient.is_contract());
    }

    #[test]
    fn test_recipient_equality_by_address() {
        let wallet = Wallet::new("Alice");
        let a = wallet.recipient();
        let b = Recipient::from_address(wallet.get_address().clone());

        assert_eq!(a, b);
        assert_ne!(a, Wallet::new("Bob").recipient());
    }

    #[test]
    fn test_balance_cache_is_advisory() {
        let wallet = Wallet::new("Alice");
        wallet.update_balance(150);
        wallet.update_balance(-50);
        assert_eq!(wallet.cached_balance(), 100);
    }

    #[test]
    fn test_debug_redacts_key() {
        let wallet = Wallet::new("Alice");
        let output = format!("{:?}", wallet);
        assert!(output.contains("[REDACTED]"));
    }
}
