use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error, Formatter},
    time::Instant,
};
use thiserror::Error;

use crate::{
    account::{Recipient, Wallet},
    crypto::{Hash, Signature},
    time::{now_millis, TimestampMillis},
    transaction::Transaction,
};

pub mod merkle;
pub mod miner;

pub use merkle::calculate_merkle_root;
pub use miner::{MinedNonce, MinerError, MinerWork};

/// Which sealing rules a block is validated against.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConsensusKind {
    ProofOfWork,
    ProofOfStake,
}

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("a block requires at least one transaction")]
    EmptyBlock,

    #[error(transparent)]
    Mining(#[from] MinerError),
}

/// A sealed group of transactions. Construction computes the merkle root and
/// the initial hash at nonce 0; sealing either mines a nonce (PoW) or has a
/// validator sign the hash (PoS).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    previous_hash: Hash,
    timestamp: TimestampMillis,
    transactions: Vec<Transaction>,
    merkle_root: Hash,
    nonce: u64,
    hash: Hash,
    // PoW sealing
    difficulty: Option<u8>,
    mine_time: Option<u64>,
    created: bool,
    // PoS sealing
    validator: Option<Recipient>,
    signature: Option<Signature>,
}

impl Block {
    pub fn new(previous_hash: Hash, transactions: Vec<Transaction>) -> Result<Self, BlockError> {
        if transactions.is_empty() {
            return Err(BlockError::EmptyBlock);
        }

        let timestamp = now_millis();
        let leaves: Vec<Hash> = transactions
            .iter()
            .map(|tx| tx.get_hash().clone())
            .collect();
        let merkle_root = calculate_merkle_root(&leaves);
        let hash = MinerWork::new(timestamp, merkle_root.clone(), previous_hash.clone())
            .hash_with_nonce(0);

        Ok(Self {
            previous_hash,
            timestamp,
            transactions,
            merkle_root,
            nonce: 0,
            hash,
            difficulty: None,
            mine_time: None,
            created: false,
            validator: None,
            signature: None,
        })
    }

    fn work(&self) -> MinerWork {
        MinerWork::new(
            self.timestamp,
            self.merkle_root.clone(),
            self.previous_hash.clone(),
        )
    }

    /// Seal by PoW: search for a nonce meeting `difficulty` leading zero hex
    /// digits across the worker pool. Fails if the nonce space is exhausted.
    pub async fn mine(&mut self, difficulty: u8) -> Result<(), BlockError> {
        let start = Instant::now();
        let mined = miner::find_nonce(&self.work(), difficulty).await?;
        let elapsed = start.elapsed().as_millis() as u64;

        self.nonce = mined.nonce;
        self.hash = mined.hash;
        self.difficulty = Some(difficulty);
        self.mine_time = Some(elapsed);
        self.created = true;

        info!(
            "mined block {} at difficulty {} (nonce {}, {} ms)",
            self.hash, difficulty, self.nonce, elapsed
        );
        Ok(())
    }

    /// Seal by PoS: the validator signs the block hash.
    pub fn sign(&mut self, validator: &Wallet) {
        self.signature = Some(validator.sign_hash(&self.hash));
        self.validator = Some(validator.recipient());
    }

    /// Recompute the hash and check the seal under the given consensus.
    pub fn validate(&self, kind: ConsensusKind) -> bool {
        if self.work().hash_with_nonce(self.nonce) != self.hash {
            return false;
        }
        match kind {
            ConsensusKind::ProofOfWork => match self.difficulty {
                Some(difficulty) => self.created && self.hash.leading_zeros() >= difficulty,
                None => false,
            },
            ConsensusKind::ProofOfStake => {
                let (Some(validator), Some(signature)) = (&self.validator, &self.signature)
                else {
                    return false;
                };
                let Some(key) = validator.get_public_key() else {
                    return false;
                };
                key.verify(self.hash.as_bytes(), signature).is_ok()
            }
        }
    }

    pub fn get_previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    pub fn get_timestamp(&self) -> TimestampMillis {
        self.timestamp
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get_txs_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn get_merkle_root(&self) -> &Hash {
        &self.merkle_root
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_hash(&self) -> &Hash {
        &self.hash
    }

    pub fn get_difficulty(&self) -> Option<u8> {
        self.difficulty
    }

    pub fn get_mine_time(&self) -> Option<u64> {
        self.mine_time
    }

    pub fn get_validator(&self) -> Option<&Recipient> {
        self.validator.as_ref()
    }

    pub fn get_signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "Block[hash: {}, previous: {}, timestamp: {}, nonce: {}, txs: {}]",
            self.hash,
            self.previous_hash,
            self.timestamp,
            self.nonce,
            self.transactions.len()
        )
    }
}
