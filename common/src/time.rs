//! Timestamp helpers.
//!
//! The wall clock only stamps transactions, blocks and contracts at
//! creation; nothing re-reads it afterwards, so hashes stay stable once
//! computed.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type TimestampMillis = u64;

/// Current wall-clock time in milliseconds.
///
/// A clock set before the epoch is treated as the epoch itself rather
/// than failing the caller.
pub fn now_millis() -> TimestampMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as TimestampMillis)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_monotonic_enough() {
        let first = now_millis();
        let second = now_millis();

        assert!(first > 0);
        assert!(second >= first);
    }
}
