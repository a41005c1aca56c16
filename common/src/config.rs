use crate::static_assert;

// Currency identity
pub const CURRENCY_NAME: &str = "Abacus";
pub const CURRENCY_CODE: &str = "ABA";
pub const CURRENCY_SYMBOL: &str = "Ⱥ";

// 8 decimals numbers
pub const COIN_DECIMALS: u8 = 8;
// 100 000 000 atomic units to represent 1 ABA
pub const COIN_VALUE: u64 = 10u64.pow(COIN_DECIMALS as u32);

// Singleton wallets created by the chain itself
// The faucet receives the genesis supply, the drain is the burn sink
pub const FAUCET_NAME: &str = "Faucet";
pub const DRAIN_NAME: &str = "Drain";

// Genesis supply credited to the faucet: 1000 ABA
pub const GENESIS_COINS_AMOUNT: u64 = 1000 * COIN_VALUE;

// Mempool size at which an automatic block creation is scheduled
pub const MAX_PENDING_TRANSACTIONS: usize = 10;
// Delay before the scheduled automatic block creation fires
pub const AUTO_CREATE_BLOCK_DELAY_SECONDS: u64 = 2;

// PoW difficulty: number of leading zero hex digits required in a block hash
pub const BLOCKCHAIN_DIFFICULTY: u8 = 2;

// Minted per transaction included in a block: 0.1 ABA
pub const REWARD_PER_MINED_TRANSACTION: u64 = COIN_VALUE / 10;
// Flat fee charged on transfers, stakes and unstakes: 0.05 ABA
pub const FIXED_TRANSACTION_FEE: u64 = COIN_VALUE / 20;
// Percentage fee applied on top of the flat fee
pub const DEFAULT_FEE_PERCENTAGE: u64 = 1;

// PoW worker pool
// Each worker scans its own disjoint nonce range of MAX_BLOCK_NONCE values
pub const BLOCK_MINER_POOL_SIZE: usize = 4;
pub const MAX_BLOCK_NONCE: u64 = 1_000_000;

// Contracts rules
// Deploying burns a base fee plus a per-byte fee on the contract code size,
// paid to the drain. Without it anyone could bloat the chain for free.
pub const CONTRACT_DEPLOY_BASE_FEE: u64 = COIN_VALUE;
pub const CONTRACT_DEPLOY_PER_BYTE_FEE: u64 = 100;

// Gas rules
// Atomic units charged per gas unit consumed
pub const GAS_PRICE: u64 = 10;
pub const DEFAULT_GAS_LIMIT: u64 = 50_000;
pub const MAX_GAS_LIMIT: u64 = 1_000_000;
// Base cost charged on every contract call
pub const GAS_COST_CONTRACT_CALL: u64 = 21_000;
// Cost per storage access from contract code
pub const GAS_COST_STORAGE_READ: u64 = 200;
pub const GAS_COST_STORAGE_WRITE: u64 = 5_000;

// Addresses format
// Wallet addresses are the prefix followed by the hex of the compressed
// public key; contract addresses use their own prefix over a hash
pub const ADDRESS_PREFIX: &str = "aba";
pub const CONTRACT_ADDRESS_PREFIX: &str = "act";

// Placeholder used as the sender component in hash preimages of
// synthesized transactions (genesis, reward, fees)
pub const COINBASE_ADDRESS: &str = "coinbase";

// Static checks
static_assert!(
    DEFAULT_GAS_LIMIT <= MAX_GAS_LIMIT,
    "Default gas limit must not exceed the maximum"
);
static_assert!(
    GAS_COST_CONTRACT_CALL <= DEFAULT_GAS_LIMIT,
    "Default gas limit must cover at least the base call cost"
);
static_assert!(
    GENESIS_COINS_AMOUNT >= COIN_VALUE,
    "Genesis supply must be at least one coin"
);
