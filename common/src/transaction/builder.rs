//! Fluent builders over the transaction constructors, carrying the chain
//! defaults so callers only spell out what differs.

use serde_json::Value;

use crate::{
    account::{Recipient, Wallet},
    config::{DEFAULT_FEE_PERCENTAGE, DEFAULT_GAS_LIMIT, MAX_GAS_LIMIT},
    transaction::{Transaction, TransactionError},
};

/// Builder for a plain value transfer.
pub struct TransferBuilder<'a> {
    from: &'a Wallet,
    to: Recipient,
    amount: u64,
    fee_percent: u64,
}

impl<'a> TransferBuilder<'a> {
    pub fn new(from: &'a Wallet, to: Recipient, amount: u64) -> Self {
        Self {
            from,
            to,
            amount,
            fee_percent: DEFAULT_FEE_PERCENTAGE,
        }
    }

    pub fn fee_percent(mut self, fee_percent: u64) -> Self {
        self.fee_percent = fee_percent;
        self
    }

    pub fn build(self) -> Transaction {
        Transaction::transfer(self.from, self.to, self.amount, self.fee_percent)
    }
}

/// Builder for a contract call: function, arguments, attached value and
/// gas limit. The limit is clamped to [`MAX_GAS_LIMIT`] at build time.
pub struct ContractCallBuilder<'a> {
    sender: &'a Wallet,
    contract: Recipient,
    function: String,
    args: Vec<Value>,
    value: u64,
    gas_limit: u64,
}

impl<'a> ContractCallBuilder<'a> {
    pub fn new(sender: &'a Wallet, contract: Recipient, function: &str) -> Self {
        Self {
            sender,
            contract,
            function: function.to_string(),
            args: Vec::new(),
            value: 0,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }

    pub fn arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Amount attached to the call (payable calls).
    pub fn value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit.min(MAX_GAS_LIMIT);
        self
    }

    pub fn build(self) -> Result<Transaction, TransactionError> {
        Transaction::contract_call(
            self.sender,
            self.contract,
            &self.function,
            self.args,
            self.value,
            self.gas_limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::COIN_VALUE;
    use crate::crypto::{hash, Address};
    use serde_json::json;

    #[test]
    fn test_transfer_builder_defaults() {
        let alice = Wallet::new("Alice");
        let bob = Wallet::new("Bob");
        let tx = TransferBuilder::new(&alice, bob.recipient(), COIN_VALUE).build();

        assert_eq!(tx.get_fee_percent(), DEFAULT_FEE_PERCENTAGE);
        assert!(tx.verify());
    }

    #[test]
    fn test_call_builder() {
        let alice = Wallet::new("Alice");
        let contract = Recipient::contract("Counter", Address::from_hash(&hash(b"counter")));

        let tx = ContractCallBuilder::new(&alice, contract, "increment")
            .arg(json!(5))
            .value(2 * COIN_VALUE)
            .gas_limit(u64::MAX)
            .build()
            .unwrap();

        assert_eq!(tx.get_function_name(), Some("increment"));
        assert_eq!(tx.get_function_args(), &[json!(5)]);
        assert_eq!(tx.get_amount(), 2 * COIN_VALUE);
        assert_eq!(tx.get_gas_limit(), Some(MAX_GAS_LIMIT));
    }
}
