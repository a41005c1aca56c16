//! Consensus variants and the proof-of-stake ledger.

use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use abacus_common::{
    account::Wallet,
    block::ConsensusKind,
    config::BLOCKCHAIN_DIFFICULTY,
    crypto::{random::secure_random_unit, Address},
};

/// One staker's locked funds plus the wallet that signs when selected.
pub struct StakeEntry {
    wallet: Arc<Wallet>,
    amount: u64,
}

impl StakeEntry {
    pub fn get_wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }
}

/// Stake bookkeeping: who locked how much. Iteration follows registration
/// order, which keeps validator selection deterministic for a given draw.
#[derive(Default)]
pub struct StakeLedger {
    stakers: IndexMap<Address, StakeEntry>,
}

impl StakeLedger {
    /// Make a wallet known to the ledger with zero locked funds. The actual
    /// amounts only move when stake transactions commit.
    pub fn register(&mut self, wallet: &Arc<Wallet>) {
        self.stakers
            .entry(wallet.get_address().clone())
            .or_insert_with(|| StakeEntry {
                wallet: Arc::clone(wallet),
                amount: 0,
            });
    }

    pub fn credit(&mut self, address: &Address, amount: u64) {
        match self.stakers.get_mut(address) {
            Some(entry) => entry.amount += amount,
            None => warn!("stake credit for unregistered staker {}", address),
        }
    }

    pub fn debit(&mut self, address: &Address, amount: u64) {
        match self.stakers.get_mut(address) {
            Some(entry) => {
                if entry.amount < amount {
                    warn!(
                        "stake debit of {} exceeds {} locked by {}",
                        amount, entry.amount, address
                    );
                }
                entry.amount = entry.amount.saturating_sub(amount);
            }
            None => warn!("stake debit for unregistered staker {}", address),
        }
    }

    pub fn stake_of(&self, address: &Address) -> u64 {
        self.stakers
            .get(address)
            .map(|entry| entry.amount)
            .unwrap_or(0)
    }

    pub fn total_stake(&self) -> u64 {
        self.stakers.values().map(|entry| entry.amount).sum()
    }

    /// Weighted random validator selection: draw `r` in `[0, 1)` from the
    /// OS CSPRNG, walk the stakers in registration order accumulating
    /// `stake / total`, and pick the first whose cumulative weight exceeds
    /// `r`. On a rounding edge the heaviest staker wins; with nothing
    /// staked the faucet validates.
    pub fn select_validator(&self, faucet: &Arc<Wallet>) -> Arc<Wallet> {
        let total = self.total_stake();
        if total == 0 {
            return Arc::clone(faucet);
        }

        let r = secure_random_unit();
        let mut cumulative = 0.0;
        for entry in self.stakers.values() {
            cumulative += entry.amount as f64 / total as f64;
            if cumulative > r {
                return Arc::clone(&entry.wallet);
            }
        }

        self.stakers
            .values()
            .max_by_key(|entry| entry.amount)
            .map(|entry| Arc::clone(&entry.wallet))
            .unwrap_or_else(|| Arc::clone(faucet))
    }
}

/// Consensus variant of a chain: a PoW difficulty or the PoS stake ledger.
pub enum Consensus {
    ProofOfWork { difficulty: u8 },
    ProofOfStake { stakes: RwLock<StakeLedger> },
}

impl Consensus {
    pub fn proof_of_work() -> Self {
        Self::proof_of_work_with_difficulty(BLOCKCHAIN_DIFFICULTY)
    }

    pub fn proof_of_work_with_difficulty(difficulty: u8) -> Self {
        Consensus::ProofOfWork { difficulty }
    }

    pub fn proof_of_stake() -> Self {
        Consensus::ProofOfStake {
            stakes: RwLock::new(StakeLedger::default()),
        }
    }

    pub fn kind(&self) -> ConsensusKind {
        match self {
            Consensus::ProofOfWork { .. } => ConsensusKind::ProofOfWork,
            Consensus::ProofOfStake { .. } => ConsensusKind::ProofOfStake,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn staked_ledger(stakes: &[(&'static str, u64)]) -> (StakeLedger, Vec<Arc<Wallet>>) {
        let mut ledger = StakeLedger::default();
        let mut wallets = Vec::new();
        for (name, amount) in stakes {
            let wallet = Arc::new(Wallet::new(name));
            ledger.register(&wallet);
            ledger.credit(wallet.get_address(), *amount);
            wallets.push(wallet);
        }
        (ledger, wallets)
    }

    #[test]
    fn test_faucet_validates_without_stake() {
        let faucet = Arc::new(Wallet::new("Faucet"));
        let ledger = StakeLedger::default();

        let selected = ledger.select_validator(&faucet);
        assert_eq!(selected.get_address(), faucet.get_address());
    }

    #[test]
    fn test_credit_and_debit() {
        let (mut ledger, wallets) = staked_ledger(&[("A", 50)]);
        let address = wallets[0].get_address();

        assert_eq!(ledger.stake_of(address), 50);
        ledger.debit(address, 20);
        assert_eq!(ledger.stake_of(address), 30);
        // Over-debit saturates instead of underflowing
        ledger.debit(address, 100);
        assert_eq!(ledger.stake_of(address), 0);
    }

    #[test]
    fn test_selection_converges_to_stake_proportions() {
        let (ledger, wallets) = staked_ledger(&[("A", 50), ("B", 30), ("C", 20)]);
        let faucet = Arc::new(Wallet::new("Faucet"));

        let draws = 10_000;
        let mut wins: HashMap<Address, u32> = HashMap::new();
        for _ in 0..draws {
            let winner = ledger.select_validator(&faucet);
            *wins.entry(winner.get_address().clone()).or_insert(0) += 1;
        }

        let expected = [0.5, 0.3, 0.2];
        for (wallet, expected) in wallets.iter().zip(expected) {
            let observed =
                *wins.get(wallet.get_address()).unwrap_or(&0) as f64 / draws as f64;
            assert!(
                (observed - expected).abs() < 0.05,
                "staker share {} too far from {}",
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_zero_stake_entry_never_selected() {
        let (mut ledger, _) = staked_ledger(&[("A", 100)]);
        let idle = Arc::new(Wallet::new("Idle"));
        ledger.register(&idle);
        let faucet = Arc::new(Wallet::new("Faucet"));

        for _ in 0..200 {
            let winner = ledger.select_validator(&faucet);
            assert_ne!(winner.get_address(), idle.get_address());
        }
    }
}
