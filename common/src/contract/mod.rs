//! User-supplied contracts: initial storage, read-only views and
//! state-mutating functions over an explicit execution context.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::{
    account::Recipient,
    crypto::{sha256_parts, Address},
    time::{now_millis, TimestampMillis},
};

pub mod runtime;

pub use runtime::{
    CallContext, CallOutcome, CallRequest, CallResult, TransferRequest, ViewContext,
};

/// Contract storage: string keys to JSON values, insertion-ordered.
pub type Storage = IndexMap<String, Value>;

/// State-mutating contract function.
pub type ContractFn =
    Box<dyn Fn(&mut CallContext, &[Value]) -> Result<Value, ContractError> + Send + Sync>;

/// Read-only view over a frozen storage snapshot.
pub type ViewFn =
    Box<dyn Fn(&ViewContext, &[Value]) -> Result<Value, ContractError> + Send + Sync>;

/// Name of the constructor run exactly once when the deploy commits.
pub const INIT_FUNCTION: &str = "__init__";

// Per-entry weight when approximating code size: closures have no stable
// serialization, so only names and a fixed overhead count
const CODE_ENTRY_WEIGHT: usize = 64;

#[derive(Debug, Error)]
pub enum ContractError {
    /// Gas consumption exceeded the caller's limit; the caller is charged
    /// the full limit.
    #[error("out of gas: used {used} of {limit}")]
    OutOfGas { used: u64, limit: u64 },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// Caller is not authorized for this action.
    #[error("caller is not authorized")]
    Ownership,

    #[error("contract already initialized")]
    AlreadyInitialized,

    // Raised by user contract code
    #[error("duplicated token")]
    DuplicatedToken,

    #[error("non-existent token")]
    NonExistentToken,

    #[error("missing data: {0}")]
    MissingData(String),

    #[error("reverted: {0}")]
    Reverted(String),
}

/// A deployed (or deployable) contract. Storage is exclusively mutated by
/// the runtime during calls and commit-time reverts.
pub struct Contract {
    name: String,
    creator: Recipient,
    address: Address,
    deployed_at: TimestampMillis,
    pub(crate) storage: Storage,
    pub(crate) views: IndexMap<String, ViewFn>,
    pub(crate) functions: IndexMap<String, ContractFn>,
    pub(crate) initialized: bool,
}

impl Contract {
    pub fn builder(name: &str, creator: Recipient) -> ContractBuilder {
        ContractBuilder {
            name: name.to_string(),
            creator,
            storage: Storage::new(),
            views: IndexMap::new(),
            functions: IndexMap::new(),
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_creator(&self) -> &Recipient {
        &self.creator
    }

    pub fn get_address(&self) -> &Address {
        &self.address
    }

    pub fn get_deployed_at(&self) -> TimestampMillis {
        self.deployed_at
    }

    pub fn get_storage(&self) -> &Storage {
        &self.storage
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// The shareable identity of this contract.
    pub fn recipient(&self) -> Recipient {
        Recipient::contract(&self.name, self.address.clone())
    }

    /// Deterministic approximation of the serialized contract size, used to
    /// price deployment: JSON length of the initial storage plus a fixed
    /// weight per function and view name.
    pub fn code_size(&self) -> usize {
        let storage_size = serde_json::to_string(&self.storage)
            .map(|json| json.len())
            .unwrap_or(0);
        let entries: usize = self
            .functions
            .keys()
            .chain(self.views.keys())
            .map(|name| name.len() + CODE_ENTRY_WEIGHT)
            .sum();
        storage_size + entries
    }

    /// Pipeline only: discard the effects of a preflighted call by putting
    /// the pre-call snapshot back.
    pub fn restore_storage(&mut self, snapshot: Storage) {
        self.storage = snapshot;
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("creator", &self.creator.get_address())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Assembles a contract: initial storage, views and functions.
pub struct ContractBuilder {
    name: String,
    creator: Recipient,
    storage: Storage,
    views: IndexMap<String, ViewFn>,
    functions: IndexMap<String, ContractFn>,
}

impl ContractBuilder {
    pub fn storage(mut self, key: &str, value: Value) -> Self {
        self.storage.insert(key.to_string(), value);
        self
    }

    pub fn function<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&mut CallContext, &[Value]) -> Result<Value, ContractError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(function));
        self
    }

    pub fn view<F>(mut self, name: &str, view: F) -> Self
    where
        F: Fn(&ViewContext, &[Value]) -> Result<Value, ContractError> + Send + Sync + 'static,
    {
        self.views.insert(name.to_string(), Box::new(view));
        self
    }

    /// Stamp the deployment time and derive the address:
    /// `sha256(deployed_at-creator_address-name)`.
    pub fn build(self) -> Contract {
        let deployed_at = now_millis();
        let address = Address::from_hash(&sha256_parts(&[
            &deployed_at.to_string(),
            self.creator.get_address().as_str(),
            &self.name,
        ]));
        Contract {
            name: self.name,
            creator: self.creator,
            address,
            deployed_at,
            storage: self.storage,
            views: self.views,
            functions: self.functions,
            initialized: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Wallet;
    use serde_json::json;

    fn counter(creator: &Wallet) -> Contract {
        Contract::builder("Counter", creator.recipient())
            .storage("count", json!(0))
            .function("increment", |ctx, args| {
                let step = args.first().and_then(|v| v.as_u64()).unwrap_or(1);
                let count = ctx.get("count")?.and_then(|v| v.as_u64()).unwrap_or(0);
                let next = count + step;
                ctx.set("count", json!(next))?;
                Ok(json!(next))
            })
            .view("get_count", |view, _| {
                Ok(view.get("count").unwrap_or(json!(0)))
            })
            .build()
    }

    #[test]
    fn test_address_is_contract_form() {
        let alice = Wallet::new("Alice");
        let contract = counter(&alice);

        assert!(contract.get_address().is_contract());
        assert!(!contract.is_initialized());
        assert_eq!(contract.get_creator().get_address(), alice.get_address());
    }

    #[test]
    fn test_code_size_deterministic_and_grows() {
        let alice = Wallet::new("Alice");
        let small = counter(&alice);
        assert_eq!(small.code_size(), small.code_size());

        let bigger = Contract::builder("Counter", alice.recipient())
            .storage("count", json!(0))
            .storage("more", json!("state"))
            .function("increment", |_, _| Ok(json!(null)))
            .function("decrement", |_, _| Ok(json!(null)))
            .build();
        assert!(bigger.code_size() > small.code_size());
    }

    #[test]
    fn test_distinct_contracts_get_distinct_addresses() {
        let alice = Wallet::new("Alice");
        let a = counter(&alice);
        let b = Contract::builder("Other", alice.recipient()).build();
        assert_ne!(a.get_address(), b.get_address());
    }
}
