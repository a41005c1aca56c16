use crate::config::{FIXED_TRANSACTION_FEE, GAS_PRICE};

// Compile-time assertion on configuration constants
#[macro_export]
macro_rules! static_assert {
    ($cond:expr, $msg:expr $(,)?) => {
        const _: () = assert!($cond, $msg);
    };
}

// Fee charged on a transfer-like transaction: flat part plus a percentage
// of the moved amount
pub fn calculate_transfer_fee(amount: u64, fee_percent: u64) -> u64 {
    FIXED_TRANSACTION_FEE + (amount as u128 * fee_percent as u128 / 100) as u64
}

// Atomic units owed for a given amount of consumed gas
pub fn calculate_gas_fee(gas_used: u64) -> u64 {
    gas_used.saturating_mul(GAS_PRICE)
}
