use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::{
    account::{Recipient, Wallet},
    config::{COINBASE_ADDRESS, MAX_GAS_LIMIT},
    contract::runtime::CallResult,
    crypto::{sha256_parts, Address, Hash, Signature},
    time::{now_millis, TimestampMillis},
    utils::{calculate_gas_fee, calculate_transfer_fee},
};

pub mod builder;

pub use builder::{ContractCallBuilder, TransferBuilder};

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("contract calls require a function name")]
    MissingFunction,

    #[error("recipient {0} is not a contract")]
    NotAContract(Address),
}

// All transaction types known to the chain.
// Genesis, Reward, Fees and Withdrawal are synthesized by the engine and
// never signed; GasOnly is a downgraded contract call kept for its gas
// charge only.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Genesis,
    Transfer,
    Reward,
    Fees,
    ContractDeploy,
    ContractCall,
    Withdrawal,
    GasOnly,
    Stake,
    Unstake,
}

impl TransactionType {
    // One character code used in hash preimages and compact logging
    pub fn code(&self) -> char {
        match self {
            TransactionType::Genesis => '_',
            TransactionType::Transfer => 'T',
            TransactionType::Reward => 'R',
            TransactionType::Fees => 'F',
            TransactionType::ContractDeploy => 'D',
            TransactionType::ContractCall => 'C',
            TransactionType::Withdrawal => 'W',
            TransactionType::GasOnly => 'G',
            TransactionType::Stake => 'S',
            TransactionType::Unstake => 'U',
        }
    }

    // Types that must carry a verifying signature in a committed block
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            TransactionType::Transfer
                | TransactionType::ContractDeploy
                | TransactionType::ContractCall
                | TransactionType::Stake
                | TransactionType::Unstake
        )
    }

    // Types whose amount is newly created supply
    pub fn is_minting(&self) -> bool {
        matches!(self, TransactionType::Genesis | TransactionType::Reward)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single value transfer or contract action. Immutable after construction
/// except for the fields the assembly pipeline owns: the type (which may be
/// downgraded to `GasOnly`) and the preflight outputs `gas_used` /
/// `call_result`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    ty: TransactionType,
    // None only for synthesized types (genesis, reward, fees)
    from: Option<Recipient>,
    to: Recipient,
    // Atomic units moved from sender to recipient
    amount: u64,
    // Percentage fee, zero except for transfers and stakes
    fee_percent: u64,
    timestamp: TimestampMillis,
    hash: Hash,
    signature: Option<Signature>,
    // Contract-related fields, present on deploys and calls
    contract: Option<Address>,
    function_name: Option<String>,
    function_args: Vec<Value>,
    gas_limit: Option<u64>,
    // Written by preflight during block assembly
    gas_used: Option<u64>,
    call_result: Option<CallResult>,
}

impl Transaction {
    fn compute_hash(
        ty: TransactionType,
        from: Option<&Recipient>,
        to: &Recipient,
        amount: u64,
        fee_percent: u64,
        timestamp: TimestampMillis,
    ) -> Hash {
        let timestamp = timestamp.to_string();
        let code = ty.code().to_string();
        let from = from
            .map(|r| r.get_address().as_str())
            .unwrap_or(COINBASE_ADDRESS);
        let amount = amount.to_string();
        let fee = fee_percent.to_string();
        sha256_parts(&[
            &timestamp,
            &code,
            from,
            to.get_address().as_str(),
            &amount,
            &fee,
        ])
    }

    fn new(
        ty: TransactionType,
        from: Option<Recipient>,
        to: Recipient,
        amount: u64,
        fee_percent: u64,
        signer: Option<&Wallet>,
    ) -> Self {
        let timestamp = now_millis();
        let hash = Self::compute_hash(ty, from.as_ref(), &to, amount, fee_percent, timestamp);
        let signature = signer.map(|wallet| wallet.sign_hash(&hash));
        Self {
            ty,
            from,
            to,
            amount,
            fee_percent,
            timestamp,
            hash,
            signature,
            contract: None,
            function_name: None,
            function_args: Vec::new(),
            gas_limit: None,
            gas_used: None,
            call_result: None,
        }
    }

    /// Signed value transfer between two endpoints.
    pub fn transfer(from: &Wallet, to: Recipient, amount: u64, fee_percent: u64) -> Self {
        Self::new(
            TransactionType::Transfer,
            Some(from.recipient()),
            to,
            amount,
            fee_percent,
            Some(from),
        )
    }

    /// Unsigned genesis credit to the faucet.
    pub fn genesis(to: Recipient, amount: u64) -> Self {
        Self::new(TransactionType::Genesis, None, to, amount, 0, None)
    }

    /// Unsigned block reward, synthesized at assembly.
    pub fn reward(to: Recipient, amount: u64) -> Self {
        Self::new(TransactionType::Reward, None, to, amount, 0, None)
    }

    /// Unsigned collected-fees credit, synthesized at assembly.
    pub fn fees(to: Recipient, amount: u64) -> Self {
        Self::new(TransactionType::Fees, None, to, amount, 0, None)
    }

    /// Signed contract deployment: burns the deploy fee to the drain.
    pub fn deploy(
        creator: &Wallet,
        contract: Address,
        drain: Recipient,
        fee_amount: u64,
    ) -> Result<Self, TransactionError> {
        if !contract.is_contract() {
            return Err(TransactionError::NotAContract(contract));
        }
        let mut tx = Self::new(
            TransactionType::ContractDeploy,
            Some(creator.recipient()),
            drain,
            fee_amount,
            0,
            Some(creator),
        );
        tx.contract = Some(contract);
        Ok(tx)
    }

    /// Signed contract call; `value` is the amount attached to the call.
    /// The gas limit is clamped to [`MAX_GAS_LIMIT`].
    pub fn contract_call(
        from: &Wallet,
        contract: Recipient,
        function: &str,
        args: Vec<Value>,
        value: u64,
        gas_limit: u64,
    ) -> Result<Self, TransactionError> {
        if !contract.is_contract() {
            return Err(TransactionError::NotAContract(contract.get_address().clone()));
        }
        if function.is_empty() {
            return Err(TransactionError::MissingFunction);
        }
        let address = contract.get_address().clone();
        let mut tx = Self::new(
            TransactionType::ContractCall,
            Some(from.recipient()),
            contract,
            value,
            0,
            Some(from),
        );
        tx.contract = Some(address);
        tx.function_name = Some(function.to_string());
        tx.function_args = args;
        tx.gas_limit = Some(gas_limit.min(MAX_GAS_LIMIT));
        Ok(tx)
    }

    /// Unsigned internal transfer out of a contract, synthesized at commit.
    pub fn withdrawal(from_contract: Recipient, to: Recipient, amount: u64) -> Self {
        Self::new(
            TransactionType::Withdrawal,
            Some(from_contract),
            to,
            amount,
            0,
            None,
        )
    }

    /// Signed stake lock-up, sent to the drain.
    pub fn stake(staker: &Wallet, drain: Recipient, amount: u64, fee_percent: u64) -> Self {
        Self::new(
            TransactionType::Stake,
            Some(staker.recipient()),
            drain,
            amount,
            fee_percent,
            Some(staker),
        )
    }

    /// Signed stake release, sent back from the drain.
    pub fn unstake(drain: &Wallet, staker: Recipient, amount: u64) -> Self {
        Self::new(
            TransactionType::Unstake,
            Some(drain.recipient()),
            staker,
            amount,
            0,
            Some(drain),
        )
    }

    pub fn get_type(&self) -> TransactionType {
        self.ty
    }

    pub fn get_from(&self) -> Option<&Recipient> {
        self.from.as_ref()
    }

    pub fn get_to(&self) -> &Recipient {
        &self.to
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_fee_percent(&self) -> u64 {
        self.fee_percent
    }

    pub fn get_timestamp(&self) -> TimestampMillis {
        self.timestamp
    }

    pub fn get_hash(&self) -> &Hash {
        &self.hash
    }

    pub fn get_signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn get_contract(&self) -> Option<&Address> {
        self.contract.as_ref()
    }

    pub fn get_function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    pub fn get_function_args(&self) -> &[Value] {
        &self.function_args
    }

    pub fn get_gas_limit(&self) -> Option<u64> {
        self.gas_limit
    }

    pub fn get_gas_used(&self) -> Option<u64> {
        self.gas_used
    }

    pub fn get_call_result(&self) -> Option<&CallResult> {
        self.call_result.as_ref()
    }

    /// True iff an attached signature verifies against the sender's public
    /// key over this transaction's hash. Any crypto failure yields false.
    pub fn verify(&self) -> bool {
        let (Some(signature), Some(from)) = (self.signature.as_ref(), self.from.as_ref()) else {
            return false;
        };
        let Some(key) = from.get_public_key() else {
            return false;
        };
        key.verify(self.hash.as_bytes(), signature).is_ok()
    }

    // Fee owed on top of the amount: flat + percentage for transfer-like
    // types, nothing for the rest (deploys burn their amount, calls pay gas)
    pub fn fee_part(&self) -> u64 {
        match self.ty {
            TransactionType::Transfer | TransactionType::Stake | TransactionType::Unstake => {
                calculate_transfer_fee(self.amount, self.fee_percent)
            }
            _ => 0,
        }
    }

    // Gas owed by the caller, known once preflight ran
    pub fn gas_cost(&self) -> u64 {
        match self.ty {
            TransactionType::ContractCall | TransactionType::GasOnly => {
                calculate_gas_fee(self.gas_used.unwrap_or(0))
            }
            _ => 0,
        }
    }

    // Amount plus fee, the sender debit excluding gas
    pub fn total_amount(&self) -> u64 {
        self.amount + self.fee_part()
    }

    /// Pipeline only: record the gas consumed by preflight.
    pub fn set_gas_used(&mut self, gas_used: u64) {
        self.gas_used = Some(gas_used);
    }

    /// Pipeline only: attach the preflight result.
    pub fn set_call_result(&mut self, result: CallResult) {
        self.call_result = Some(result);
    }

    /// Pipeline only: keep this call for its gas charge alone. The hash and
    /// signature still cover the original construction-time fields.
    pub fn downgrade_to_gas_only(&mut self) {
        self.ty = TransactionType::GasOnly;
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self
            .from
            .as_ref()
            .map(|r| r.get_name())
            .unwrap_or(COINBASE_ADDRESS);
        write!(
            f,
            "[{}] {} -> {}: {}",
            self.ty.code(),
            from,
            self.to.get_name(),
            self.amount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{COIN_VALUE, DEFAULT_GAS_LIMIT, FIXED_TRANSACTION_FEE, GAS_PRICE};
    use crate::crypto::hash;
    use serde_json::json;

    fn contract_recipient() -> Recipient {
        Recipient::contract("Counter", Address::from_hash(&hash(b"counter")))
    }

    #[test]
    fn test_transfer_is_signed_and_verifies() {
        let alice = Wallet::new("Alice");
        let bob = Wallet::new("Bob");
        let tx = Transaction::transfer(&alice, bob.recipient(), COIN_VALUE, 1);

        assert_eq!(tx.get_type(), TransactionType::Transfer);
        assert!(tx.get_signature().is_some());
        assert!(tx.verify());
    }

    #[test]
    fn test_synthesized_types_do_not_verify() {
        let bob = Wallet::new("Bob");
        assert!(!Transaction::genesis(bob.recipient(), COIN_VALUE).verify());
        assert!(!Transaction::reward(bob.recipient(), COIN_VALUE).verify());
        assert!(!Transaction::fees(bob.recipient(), COIN_VALUE).verify());
    }

    #[test]
    fn test_withdrawal_has_sender_but_no_signature() {
        let contract = contract_recipient();
        let bob = Wallet::new("Bob");
        let tx = Transaction::withdrawal(contract, bob.recipient(), 5);

        assert!(tx.get_from().is_some());
        assert!(tx.get_signature().is_none());
        assert!(!tx.verify());
    }

    #[test]
    fn test_hash_covers_amount() {
        let alice = Wallet::new("Alice");
        let bob = Wallet::new("Bob");
        let a = Transaction::transfer(&alice, bob.recipient(), 1, 1);
        let b = Transaction::transfer(&alice, bob.recipient(), 2, 1);
        assert_ne!(a.get_hash(), b.get_hash());
    }

    #[test]
    fn test_contract_call_requires_function() {
        let alice = Wallet::new("Alice");
        let result = Transaction::contract_call(
            &alice,
            contract_recipient(),
            "",
            vec![],
            0,
            DEFAULT_GAS_LIMIT,
        );
        assert!(matches!(result, Err(TransactionError::MissingFunction)));
    }

    #[test]
    fn test_contract_call_rejects_wallet_recipient() {
        let alice = Wallet::new("Alice");
        let bob = Wallet::new("Bob");
        let result =
            Transaction::contract_call(&alice, bob.recipient(), "f", vec![], 0, DEFAULT_GAS_LIMIT);
        assert!(matches!(result, Err(TransactionError::NotAContract(_))));
    }

    #[test]
    fn test_gas_limit_clamped() {
        let alice = Wallet::new("Alice");
        let tx = Transaction::contract_call(
            &alice,
            contract_recipient(),
            "increment",
            vec![json!(5)],
            0,
            u64::MAX,
        )
        .unwrap();
        assert_eq!(tx.get_gas_limit(), Some(crate::config::MAX_GAS_LIMIT));
    }

    #[test]
    fn test_fee_part_per_type() {
        let alice = Wallet::new("Alice");
        let bob = Wallet::new("Bob");

        let transfer = Transaction::transfer(&alice, bob.recipient(), 100 * COIN_VALUE, 1);
        assert_eq!(transfer.fee_part(), FIXED_TRANSACTION_FEE + COIN_VALUE);
        assert_eq!(
            transfer.total_amount(),
            100 * COIN_VALUE + FIXED_TRANSACTION_FEE + COIN_VALUE
        );

        let reward = Transaction::reward(bob.recipient(), COIN_VALUE);
        assert_eq!(reward.fee_part(), 0);
    }

    #[test]
    fn test_downgrade_keeps_hash_and_charges_gas() {
        let alice = Wallet::new("Alice");
        let mut tx = Transaction::contract_call(
            &alice,
            contract_recipient(),
            "increment",
            vec![],
            0,
            DEFAULT_GAS_LIMIT,
        )
        .unwrap();
        let original_hash = tx.get_hash().clone();

        tx.set_gas_used(30_000);
        tx.downgrade_to_gas_only();

        assert_eq!(tx.get_type(), TransactionType::GasOnly);
        assert_eq!(tx.get_hash(), &original_hash);
        assert_eq!(tx.gas_cost(), 30_000 * GAS_PRICE);
    }

    #[test]
    fn test_type_codes_are_distinct() {
        let codes = [
            TransactionType::Genesis,
            TransactionType::Transfer,
            TransactionType::Reward,
            TransactionType::Fees,
            TransactionType::ContractDeploy,
            TransactionType::ContractCall,
            TransactionType::Withdrawal,
            TransactionType::GasOnly,
            TransactionType::Stake,
            TransactionType::Unstake,
        ]
        .map(|t| t.code());
        let unique: std::collections::HashSet<char> = codes.iter().copied().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
