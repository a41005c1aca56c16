/// Cryptographically secure random number generation
///
/// All randomness that can influence consensus (validator selection in
/// particular) must come from the operating system CSPRNG, never from
/// `thread_rng()`.
use rand::rngs::OsRng;
use rand::RngCore;

/// Generate cryptographically secure random bytes
pub fn secure_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a cryptographically secure random u64
pub fn secure_random_u64() -> u64 {
    OsRng.next_u64()
}

/// Generate a cryptographically secure random float in `[0, 1)`
///
/// Uses the 53 high bits of a random u64, the maximum precision an f64
/// mantissa can hold, so the result is uniform over the representable grid.
pub fn secure_random_unit() -> f64 {
    (secure_random_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_random_bytes() {
        let bytes1 = secure_random_bytes::<32>();
        let bytes2 = secure_random_bytes::<32>();

        // Random bytes should be different each time
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_secure_random_u64() {
        let n1 = secure_random_u64();
        let n2 = secure_random_u64();

        assert_ne!(n1, n2);
    }

    #[test]
    fn test_secure_random_unit_range() {
        for _ in 0..1000 {
            let r = secure_random_unit();
            assert!((0.0..1.0).contains(&r));
        }
    }
}
