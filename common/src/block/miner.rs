//! Proof-of-work nonce search over a pool of blocking workers.
//!
//! Each worker owns a disjoint nonce range and reports at most one message
//! on a bounded channel: the winning nonce or its own exhaustion. The first
//! success raises a shared stop flag; the pool is joined before returning so
//! no worker outlives the mining attempt.

use log::debug;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    config::{BLOCK_MINER_POOL_SIZE, MAX_BLOCK_NONCE},
    crypto::{sha256_parts, Hash},
    time::TimestampMillis,
};

// How many nonces a worker grinds between checks of the stop flag
const STOP_CHECK_INTERVAL: u64 = 1024;

/// Immutable inputs of a PoW search, shared by every worker.
#[derive(Clone)]
pub struct MinerWork {
    timestamp: TimestampMillis,
    merkle_root: Hash,
    previous_hash: Hash,
}

impl MinerWork {
    pub fn new(timestamp: TimestampMillis, merkle_root: Hash, previous_hash: Hash) -> Self {
        Self {
            timestamp,
            merkle_root,
            previous_hash,
        }
    }

    // Block hash preimage: timestamp-merkle_root-previous_hash-nonce
    pub fn hash_with_nonce(&self, nonce: u64) -> Hash {
        sha256_parts(&[
            &self.timestamp.to_string(),
            &self.merkle_root.to_hex(),
            &self.previous_hash.to_hex(),
            &nonce.to_string(),
        ])
    }
}

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("all {0} workers exhausted their nonce ranges")]
    Exhausted(usize),
}

/// A winning nonce and the block hash it produces.
#[derive(Debug)]
pub struct MinedNonce {
    pub nonce: u64,
    pub hash: Hash,
}

/// Search for a nonce whose hash carries at least `difficulty` leading zero
/// hex digits. Worker `i` scans `[i * range, (i + 1) * range)`.
pub async fn find_nonce(work: &MinerWork, difficulty: u8) -> Result<MinedNonce, MinerError> {
    find_nonce_in_ranges(work, difficulty, BLOCK_MINER_POOL_SIZE, MAX_BLOCK_NONCE).await
}

async fn find_nonce_in_ranges(
    work: &MinerWork,
    difficulty: u8,
    pool_size: usize,
    range: u64,
) -> Result<MinedNonce, MinerError> {
    let stop = Arc::new(AtomicBool::new(false));
    // One slot per worker: a worker sends exactly one message and never blocks
    let (sender, mut receiver) = mpsc::channel(pool_size);
    let mut handles = Vec::with_capacity(pool_size);

    for worker in 0..pool_size {
        let work = work.clone();
        let stop = stop.clone();
        let sender = sender.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let start = worker as u64 * range;
            let end = start + range;
            for nonce in start..end {
                if nonce % STOP_CHECK_INTERVAL == 0 && stop.load(Ordering::Relaxed) {
                    let _ = sender.blocking_send(None);
                    return;
                }
                let hash = work.hash_with_nonce(nonce);
                if hash.leading_zeros() >= difficulty {
                    stop.store(true, Ordering::Relaxed);
                    debug!("worker {} found nonce {}", worker, nonce);
                    let _ = sender.blocking_send(Some(MinedNonce { nonce, hash }));
                    return;
                }
            }
            let _ = sender.blocking_send(None);
        }));
    }
    drop(sender);

    let mut found = None;
    while let Some(message) = receiver.recv().await {
        if let Some(mined) = message {
            stop.store(true, Ordering::Relaxed);
            found = Some(mined);
            break;
        }
    }

    // Join the pool so no worker outlives this attempt
    for handle in handles {
        let _ = handle.await;
    }

    found.ok_or(MinerError::Exhausted(pool_size))
}
