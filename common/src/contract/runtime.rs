//! Gas-metered contract execution.
//!
//! A call runs in two phases. Preflight (`execute_call`) meters storage
//! access over a working copy and, on success, installs the mutated storage
//! while handing the pre-call snapshot to the caller. The block-assembly
//! pipeline later either keeps the new storage and turns the requested
//! transfers into withdrawal transactions, or puts the snapshot back.

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::{GAS_COST_CONTRACT_CALL, GAS_COST_STORAGE_READ, GAS_COST_STORAGE_WRITE},
    crypto::Address,
};

use super::{Contract, ContractError, Storage, ViewFn, INIT_FUNCTION};

/// Caller-visible message data.
pub struct MsgInfo {
    pub sender: Address,
    /// Amount attached to the call.
    pub value: u64,
}

/// Chain environment exposed to a call.
pub struct EnvInfo {
    /// Contract funds available during the call, attached value included.
    pub contract_balance: u64,
    /// Address of the burn sink.
    pub drain: Address,
}

/// An outgoing transfer requested by contract code via `emit_transfer`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: Address,
    pub amount: u64,
}

/// Execution context handed to a contract function: metered storage access,
/// message/environment data and the transfer collector.
pub struct CallContext<'a> {
    // Working copy; the real storage is only replaced on success
    storage: Storage,
    // Pre-call state the views are bound to
    frozen: &'a Storage,
    views: &'a IndexMap<String, ViewFn>,
    msg: MsgInfo,
    env: EnvInfo,
    creator: Address,
    address: Address,
    gas_used: u64,
    gas_limit: u64,
    // `__init__` runs unmetered
    metered: bool,
    transfers: Vec<TransferRequest>,
}

impl<'a> CallContext<'a> {
    fn charge(&mut self, gas: u64) -> Result<(), ContractError> {
        if !self.metered {
            return Ok(());
        }
        self.gas_used += gas;
        if self.gas_used > self.gas_limit {
            return Err(ContractError::OutOfGas {
                used: self.gas_used,
                limit: self.gas_limit,
            });
        }
        Ok(())
    }

    /// Metered storage read.
    pub fn get(&mut self, key: &str) -> Result<Option<Value>, ContractError> {
        self.charge(GAS_COST_STORAGE_READ)?;
        Ok(self.storage.get(key).cloned())
    }

    /// Metered storage write.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ContractError> {
        self.charge(GAS_COST_STORAGE_WRITE)?;
        self.storage.insert(key.to_string(), value);
        Ok(())
    }

    /// Run one of the contract's views against the pre-call snapshot.
    /// View reads are not metered.
    pub fn view(&self, name: &str, args: &[Value]) -> Result<Value, ContractError> {
        let view = self
            .views
            .get(name)
            .ok_or_else(|| ContractError::UnknownFunction(name.to_string()))?;
        view(&ViewContext { storage: self.frozen }, args)
    }

    /// Request an outgoing transfer from the contract balance. Collected
    /// transfers become withdrawal transactions if the call commits.
    pub fn emit_transfer(&mut self, to: Address, amount: u64) {
        self.transfers.push(TransferRequest { to, amount });
    }

    pub fn msg(&self) -> &MsgInfo {
        &self.msg
    }

    pub fn env(&self) -> &EnvInfo {
        &self.env
    }

    pub fn creator(&self) -> &Address {
        &self.creator
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    fn finish(self) -> (Storage, u64, Vec<TransferRequest>) {
        (self.storage, self.gas_used, self.transfers)
    }
}

/// Read-only storage handle for views. The borrow keeps the snapshot
/// frozen for the lifetime of the view.
pub struct ViewContext<'a> {
    storage: &'a Storage,
}

impl<'a> ViewContext<'a> {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.storage.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.storage.contains_key(key)
    }
}

/// Outcome of a call as seen by the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub gas_used: u64,
}

impl CallResult {
    fn success(result: Value, gas_used: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            gas_used,
        }
    }

    fn failure(error: String, gas_used: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            gas_used,
        }
    }
}

/// Full preflight outcome: the caller-visible result, the requested
/// transfers, and the pre-call snapshot when storage was mutated.
pub struct CallOutcome {
    pub result: CallResult,
    pub transfers: Vec<TransferRequest>,
    pub snapshot: Option<Storage>,
}

impl CallOutcome {
    fn failure(error: ContractError, gas_used: u64) -> Self {
        Self {
            result: CallResult::failure(error.to_string(), gas_used),
            transfers: Vec::new(),
            snapshot: None,
        }
    }
}

/// Inputs of a contract call.
pub struct CallRequest {
    pub caller: Address,
    pub value: u64,
    pub gas_limit: u64,
    pub function: String,
    pub args: Vec<Value>,
    /// Contract ledger balance before the attached value is credited.
    pub contract_balance: u64,
    pub drain: Address,
}

/// Preflight a contract call. Every call pays the base cost up front, then
/// each storage access is metered; exceeding the limit traps with the full
/// limit charged. On success the mutated storage is installed and the
/// pre-call snapshot returned for a possible commit-time revert; on failure
/// the contract storage is untouched.
pub fn execute_call(contract: &mut Contract, request: CallRequest) -> CallOutcome {
    let gas_used = GAS_COST_CONTRACT_CALL;
    if gas_used > request.gas_limit {
        return CallOutcome::failure(
            ContractError::OutOfGas {
                used: gas_used,
                limit: request.gas_limit,
            },
            request.gas_limit,
        );
    }

    let Some(function) = contract.functions.get(&request.function) else {
        return CallOutcome::failure(
            ContractError::UnknownFunction(request.function.clone()),
            gas_used,
        );
    };

    let snapshot = contract.storage.clone();
    let mut ctx = CallContext {
        storage: contract.storage.clone(),
        frozen: &snapshot,
        views: &contract.views,
        msg: MsgInfo {
            sender: request.caller,
            value: request.value,
        },
        env: EnvInfo {
            contract_balance: request.contract_balance + request.value,
            drain: request.drain,
        },
        creator: contract.creator.get_address().clone(),
        address: contract.address.clone(),
        gas_used,
        gas_limit: request.gas_limit,
        metered: true,
        transfers: Vec::new(),
    };

    let outcome = function(&mut ctx, &request.args);
    let (storage, gas_used, transfers) = ctx.finish();

    match outcome {
        Ok(value) => {
            contract.storage = storage;
            CallOutcome {
                result: CallResult::success(value, gas_used),
                transfers,
                snapshot: Some(snapshot),
            }
        }
        Err(error) => {
            // An out-of-gas trap charges the full limit no matter where it fired
            let charged = match error {
                ContractError::OutOfGas { .. } => request.gas_limit,
                _ => gas_used,
            };
            debug!(
                "call {}::{} reverted: {}",
                contract.get_name(),
                request.function,
                error
            );
            CallOutcome::failure(error, charged)
        }
    }
}

/// Run `__init__` at deploy commit: exactly once, creator only, unmetered,
/// writing to real storage. Deployment is atomic with init, so a failing
/// init leaves the initial storage untouched and the contract unregistered.
pub fn run_init(contract: &mut Contract, caller: &Address, drain: &Address) -> Result<(), ContractError> {
    if contract.initialized {
        return Err(ContractError::AlreadyInitialized);
    }
    if caller != contract.creator.get_address() {
        return Err(ContractError::Ownership);
    }

    if let Some(init) = contract.functions.get(INIT_FUNCTION) {
        let frozen = contract.storage.clone();
        let mut ctx = CallContext {
            storage: contract.storage.clone(),
            frozen: &frozen,
            views: &contract.views,
            msg: MsgInfo {
                sender: caller.clone(),
                value: 0,
            },
            env: EnvInfo {
                contract_balance: 0,
                drain: drain.clone(),
            },
            creator: contract.creator.get_address().clone(),
            address: contract.address.clone(),
            gas_used: 0,
            gas_limit: 0,
            metered: false,
            transfers: Vec::new(),
        };
        let outcome = init(&mut ctx, &[]);
        let (storage, _, _) = ctx.finish();
        outcome?;
        contract.storage = storage;
    }

    contract.initialized = true;
    Ok(())
}

/// Off-chain view call: gas-free, over the current storage, which the
/// read-only context keeps frozen for the duration of the view.
pub fn execute_view(contract: &Contract, name: &str, args: &[Value]) -> Result<Value, ContractError> {
    let view = contract
        .views
        .get(name)
        .ok_or_else(|| ContractError::UnknownFunction(name.to_string()))?;
    view(
        &ViewContext {
            storage: &contract.storage,
        },
        args,
    )
}
