// Merkle root calculation for transaction lists

use crate::crypto::{sha256_parts, Hash};

/// Calculate the merkle root from a list of leaf hashes
///
/// This folds a binary merkle tree bottom-up:
/// - Parent nodes are `sha256(left-right)` over the hex encodings
/// - If a level has an odd count, the last node is paired with itself
/// - A single leaf is its own root
///
/// Order-sensitive: swapping two leaves changes the root.
pub fn calculate_merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        // Empty merkle root (all zeros)
        return Hash::zero();
    }

    let mut hashes: Vec<Hash> = leaves.to_vec();

    // Build merkle tree bottom-up
    while hashes.len() > 1 {
        let mut next_level = Vec::with_capacity(hashes.len().div_ceil(2));

        // Process pairs
        for chunk in hashes.chunks(2) {
            let left = &chunk[0];
            let right = if chunk.len() == 2 {
                &chunk[1]
            } else {
                // Odd number: pair with itself
                &chunk[0]
            };

            next_level.push(hash_pair(left, right));
        }

        hashes = next_level;
    }

    hashes.swap_remove(0)
}

/// Hash a pair of hashes
fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    sha256_parts(&[&left.to_hex(), &right.to_hex()])
}
