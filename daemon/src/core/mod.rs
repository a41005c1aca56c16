pub mod blockchain;
pub mod consensus;
pub mod error;
pub mod mempool;

pub use blockchain::{Blockchain, CallOptions};
pub use consensus::Consensus;
pub use error::BlockchainError;
pub use mempool::Mempool;
