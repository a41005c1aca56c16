//! The ledger engine: mempool admission, the block-assembly pipeline shared
//! by both consensus variants, balance and supply queries, and the contract
//! deploy/call surface.
//!
//! All chain state lives behind async locks inside an `Arc<Blockchain>`;
//! mutation happens on the owning task. Block assembly validates economic
//! constraints against running balances and commits contract state
//! transitions atomically with the block itself.

use indexmap::IndexMap;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::sleep,
};

use abacus_common::{
    account::{Recipient, Wallet},
    block::{calculate_merkle_root, Block, ConsensusKind},
    config::{
        AUTO_CREATE_BLOCK_DELAY_SECONDS, CONTRACT_DEPLOY_BASE_FEE, CONTRACT_DEPLOY_PER_BYTE_FEE,
        DEFAULT_FEE_PERCENTAGE, DEFAULT_GAS_LIMIT, DRAIN_NAME, FAUCET_NAME, GENESIS_COINS_AMOUNT,
        MAX_PENDING_TRANSACTIONS, REWARD_PER_MINED_TRANSACTION,
    },
    contract::{
        runtime::{self, CallOutcome, CallRequest},
        Contract,
    },
    crypto::{Address, Hash},
    transaction::{ContractCallBuilder, Transaction, TransactionType},
};

use super::{consensus::Consensus, error::BlockchainError, mempool::Mempool};

/// Options of a contract call: attached value and gas limit.
#[derive(Clone, Copy)]
pub struct CallOptions {
    pub value: u64,
    pub gas_limit: u64,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            value: 0,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

// Clears the creating-block flag on every exit path of create_block
struct CreatingGuard<'a>(&'a AtomicBool);

impl Drop for CreatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Blockchain {
    consensus: Consensus,
    blocks: RwLock<Vec<Block>>,
    mempool: RwLock<Mempool>,
    // Registered contracts, addressable by calls
    contracts: RwLock<IndexMap<Address, Contract>>,
    // Deployed but not yet committed
    pending_contracts: RwLock<IndexMap<Address, Contract>>,
    faucet: Arc<Wallet>,
    drain: Arc<Wallet>,
    // Mutual exclusion of concurrent create_block calls
    creating_block: AtomicBool,
    // Pending automatic block creation, cancelled by a voluntary one
    auto_create: Mutex<Option<JoinHandle<()>>>,
}

impl Blockchain {
    /// Create a chain and build its genesis block.
    pub async fn new(consensus: Consensus) -> Result<Arc<Self>, BlockchainError> {
        let chain = Arc::new(Self {
            consensus,
            blocks: RwLock::new(Vec::new()),
            mempool: RwLock::new(Mempool::new()),
            contracts: RwLock::new(IndexMap::new()),
            pending_contracts: RwLock::new(IndexMap::new()),
            faucet: Arc::new(Wallet::new(FAUCET_NAME)),
            drain: Arc::new(Wallet::new(DRAIN_NAME)),
            creating_block: AtomicBool::new(false),
            auto_create: Mutex::new(None),
        });
        chain.init().await?;
        Ok(chain)
    }

    // Genesis block: a single transaction crediting the faucet. PoW mines
    // the anchor at the chain difficulty; PoS accepts it unsealed.
    async fn init(&self) -> Result<(), BlockchainError> {
        let genesis = Transaction::genesis(self.faucet.recipient(), GENESIS_COINS_AMOUNT);
        let mut block = Block::new(Hash::zero(), vec![genesis])?;
        if let Consensus::ProofOfWork { difficulty } = &self.consensus {
            block.mine(*difficulty).await?;
        }
        info!(
            "genesis block {} credits {} with {}",
            block.get_hash(),
            FAUCET_NAME,
            GENESIS_COINS_AMOUNT
        );
        self.blocks.write().await.push(block);
        Ok(())
    }

    pub fn get_faucet(&self) -> &Arc<Wallet> {
        &self.faucet
    }

    pub fn get_drain_address(&self) -> &Address {
        self.drain.get_address()
    }

    pub fn drain_recipient(&self) -> Recipient {
        self.drain.recipient()
    }

    pub fn get_consensus_kind(&self) -> ConsensusKind {
        self.consensus.kind()
    }

    /// Validate a transaction and append it to the mempool. Reaching the
    /// pending cap arms the automatic block creation timer.
    pub async fn add_transaction(
        self: &Arc<Self>,
        transaction: Transaction,
    ) -> Result<(), BlockchainError> {
        let Some(from) = transaction.get_from() else {
            return Err(BlockchainError::MissingSender);
        };
        if from.get_address() == transaction.get_to().get_address() {
            return Err(BlockchainError::SameEndpoints);
        }
        if transaction.get_type() == TransactionType::Transfer && transaction.get_amount() == 0 {
            return Err(BlockchainError::ZeroAmount);
        }
        if !transaction.verify() {
            return Err(BlockchainError::InvalidSignature);
        }

        let pending = {
            let mut mempool = self.mempool.write().await;
            mempool.push(transaction);
            mempool.len()
        };
        debug!("transaction admitted, {} pending", pending);

        if pending >= MAX_PENDING_TRANSACTIONS {
            self.schedule_auto_create().await;
        }
        Ok(())
    }

    // Arm the auto-create timer unless one is already pending. The
    // automatic creation rewards the drain (PoW) or the selected validator
    // (PoS), both reached through a None reward target.
    async fn schedule_auto_create(self: &Arc<Self>) {
        let mut slot = self.auto_create.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        info!(
            "mempool reached {} transactions, block creation in {}s",
            MAX_PENDING_TRANSACTIONS, AUTO_CREATE_BLOCK_DELAY_SECONDS
        );
        let chain = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            sleep(Duration::from_secs(AUTO_CREATE_BLOCK_DELAY_SECONDS)).await;
            // Release our own handle first so create_block only cancels
            // timers that are still pending
            chain.auto_create.lock().await.take();
            if let Err(e) = chain.create_block(None).await {
                warn!("automatic block creation failed: {}", e);
            }
        }));
    }

    /// Submit a contract deployment. The deploy fee (base + per byte of
    /// code size) is burned to the drain; the contract is registered only
    /// when the containing block commits.
    pub async fn deploy_contract(
        self: &Arc<Self>,
        creator: &Wallet,
        contract: Contract,
    ) -> Result<Address, BlockchainError> {
        if creator.get_address() != contract.get_creator().get_address() {
            return Err(BlockchainError::Ownership);
        }

        let fee = CONTRACT_DEPLOY_BASE_FEE
            + CONTRACT_DEPLOY_PER_BYTE_FEE * contract.code_size() as u64;
        let address = contract.get_address().clone();
        let transaction =
            Transaction::deploy(creator, address.clone(), self.drain.recipient(), fee)?;

        self.pending_contracts
            .write()
            .await
            .insert(address.clone(), contract);
        if let Err(e) = self.add_transaction(transaction).await {
            self.pending_contracts.write().await.shift_remove(&address);
            return Err(e);
        }
        info!("contract {} deployment submitted, fee {}", address, fee);
        Ok(address)
    }

    /// Submit a signed contract call. Returns the transaction hash.
    pub async fn invoke_contract(
        self: &Arc<Self>,
        sender: &Wallet,
        contract: &Address,
        function: &str,
        args: Vec<Value>,
        options: CallOptions,
    ) -> Result<Hash, BlockchainError> {
        let recipient = self
            .contract_recipient(contract)
            .await
            .ok_or_else(|| BlockchainError::UnknownContract(contract.clone()))?;
        let transaction = ContractCallBuilder::new(sender, recipient, function)
            .args(args)
            .value(options.value)
            .gas_limit(options.gas_limit)
            .build()?;
        let hash = transaction.get_hash().clone();
        self.add_transaction(transaction).await?;
        Ok(hash)
    }

    /// Identity of a registered or pending contract.
    pub async fn contract_recipient(&self, address: &Address) -> Option<Recipient> {
        if let Some(contract) = self.contracts.read().await.get(address) {
            return Some(contract.recipient());
        }
        self.pending_contracts
            .read()
            .await
            .get(address)
            .map(|contract| contract.recipient())
    }

    pub async fn is_contract_registered(&self, address: &Address) -> bool {
        self.contracts.read().await.contains_key(address)
    }

    /// Off-chain view call: gas-free and without any chain effect.
    pub async fn view_contract(
        &self,
        address: &Address,
        name: &str,
        args: &[Value],
    ) -> Result<Value, BlockchainError> {
        let contracts = self.contracts.read().await;
        let contract = contracts
            .get(address)
            .ok_or_else(|| BlockchainError::UnknownContract(address.clone()))?;
        Ok(runtime::execute_view(contract, name, args)?)
    }

    /// Lock funds as stake (PoS only). The staker is registered right away
    /// so it can be selected once the stake transaction commits.
    pub async fn stake(
        self: &Arc<Self>,
        staker: &Arc<Wallet>,
        amount: u64,
    ) -> Result<(), BlockchainError> {
        let Consensus::ProofOfStake { stakes } = &self.consensus else {
            return Err(BlockchainError::NotProofOfStake);
        };
        stakes.write().await.register(staker);
        let transaction = Transaction::stake(
            staker,
            self.drain.recipient(),
            amount,
            DEFAULT_FEE_PERCENTAGE,
        );
        self.add_transaction(transaction).await
    }

    /// Release staked funds (PoS only). Requires the recorded stake to
    /// cover the amount; the drain signs the release.
    pub async fn unstake(
        self: &Arc<Self>,
        staker: &Arc<Wallet>,
        amount: u64,
    ) -> Result<(), BlockchainError> {
        let Consensus::ProofOfStake { stakes } = &self.consensus else {
            return Err(BlockchainError::NotProofOfStake);
        };
        let have = stakes.read().await.stake_of(staker.get_address());
        if have < amount {
            return Err(BlockchainError::InsufficientStake { need: amount, have });
        }
        let transaction = Transaction::unstake(&self.drain, staker.recipient(), amount);
        self.add_transaction(transaction).await
    }

    pub async fn get_stake(&self, address: &Address) -> u64 {
        match &self.consensus {
            Consensus::ProofOfStake { stakes } => stakes.read().await.stake_of(address),
            Consensus::ProofOfWork { .. } => 0,
        }
    }

    pub async fn get_total_stake(&self) -> u64 {
        match &self.consensus {
            Consensus::ProofOfStake { stakes } => stakes.read().await.total_stake(),
            Consensus::ProofOfWork { .. } => 0,
        }
    }

    // Replay a ledger slice for one address: credit receipts, debit spends
    // plus gas. GasOnly calls transfer nothing and only charge gas.
    fn balance_in(blocks: &[Block], address: &Address) -> i128 {
        let mut balance: i128 = 0;
        for block in blocks {
            for tx in block.get_transactions() {
                if tx.get_type() != TransactionType::GasOnly
                    && tx.get_to().get_address() == address
                {
                    balance += tx.get_amount() as i128;
                }
                if let Some(from) = tx.get_from() {
                    if from.get_address() == address {
                        balance -= match tx.get_type() {
                            TransactionType::ContractDeploy => tx.get_amount() as i128,
                            TransactionType::ContractCall => {
                                tx.get_amount() as i128 + tx.gas_cost() as i128
                            }
                            TransactionType::GasOnly => tx.gas_cost() as i128,
                            _ => tx.total_amount() as i128,
                        };
                    }
                }
            }
        }
        balance
    }

    /// Authoritative balance: a full replay of the committed ledger.
    pub async fn get_balance(&self, address: &Address) -> u64 {
        let blocks = self.blocks.read().await;
        Self::balance_in(&blocks, address).max(0) as u64
    }

    /// Supply ever minted: genesis plus block rewards.
    pub async fn get_total_supply(&self) -> u64 {
        let blocks = self.blocks.read().await;
        blocks
            .iter()
            .flat_map(|block| block.get_transactions())
            .filter(|tx| tx.get_type().is_minting())
            .map(|tx| tx.get_amount())
            .sum()
    }

    /// Everything sent to the drain counts as removed from circulation.
    pub async fn get_drained_amount(&self) -> u64 {
        self.get_balance(self.drain.get_address()).await
    }

    pub async fn get_circulating_supply(&self) -> u64 {
        let total = self.get_total_supply().await;
        let drained = self.get_drained_amount().await;
        total.saturating_sub(drained)
    }

    pub async fn get_height(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn get_block_at(&self, index: usize) -> Option<Block> {
        self.blocks.read().await.get(index).cloned()
    }

    pub async fn get_latest_hash(&self) -> Hash {
        self.blocks
            .read()
            .await
            .last()
            .map(|block| block.get_hash().clone())
            .unwrap_or_else(Hash::zero)
    }

    pub async fn get_mempool_size(&self) -> usize {
        self.mempool.read().await.len()
    }

    pub async fn mempool_contains(&self, hash: &Hash) -> bool {
        self.mempool.read().await.contains(hash)
    }

    /// Walk the whole chain checking linkage, seals, merkle roots and the
    /// signatures of every signed transaction. The genesis block is the
    /// anchor: linkage always, the seal only under PoW where it is mined.
    pub async fn validate_integrity(&self) -> Result<(), BlockchainError> {
        let blocks = self.blocks.read().await;
        let kind = self.consensus.kind();

        for (index, block) in blocks.iter().enumerate() {
            if index == 0 {
                if block.get_previous_hash() != &Hash::zero() {
                    return Err(BlockchainError::InvariantViolation(
                        "genesis block must anchor on the zero hash".to_string(),
                    ));
                }
                if kind == ConsensusKind::ProofOfWork && !block.validate(kind) {
                    return Err(BlockchainError::InvariantViolation(
                        "genesis block failed proof-of-work validation".to_string(),
                    ));
                }
            } else {
                if Some(block.get_previous_hash()) != blocks.get(index - 1).map(|b| b.get_hash())
                {
                    return Err(BlockchainError::InvariantViolation(format!(
                        "block {} does not link to its predecessor",
                        index
                    )));
                }
                if !block.validate(kind) {
                    return Err(BlockchainError::InvariantViolation(format!(
                        "block {} failed {:?} validation",
                        index, kind
                    )));
                }
            }

            let leaves: Vec<Hash> = block
                .get_transactions()
                .iter()
                .map(|tx| tx.get_hash().clone())
                .collect();
            if &calculate_merkle_root(&leaves) != block.get_merkle_root() {
                return Err(BlockchainError::InvariantViolation(format!(
                    "block {} merkle root does not cover its transactions",
                    index
                )));
            }

            for tx in block.get_transactions() {
                if tx.get_type().is_signed() && !tx.verify() {
                    return Err(BlockchainError::InvariantViolation(format!(
                        "unverifiable {} transaction {} in block {}",
                        tx.get_type(),
                        tx.get_hash(),
                        index
                    )));
                }
            }
        }
        Ok(())
    }

    /// Assemble, seal and commit a block from the mempool.
    ///
    /// Mempool transactions are processed in submission order: signatures
    /// are re-checked, contract calls preflighted, and spending applied to
    /// running balances loaded lazily from the ledger. Senders that cannot
    /// cover their spending are dropped (contract calls fall back to a
    /// gas-only charge when they can at least afford the gas). Reward and
    /// fees transactions are synthesized for the kept set, withdrawals for
    /// the transfers requested by successful calls. The sealed block is
    /// appended and the kept transactions pruned from the mempool.
    ///
    /// Returns the new block hash, or `None` when nothing was eligible.
    /// Under PoW the reward goes to `reward_to` (drain by default); under
    /// PoS the selected validator is rewarded regardless.
    pub async fn create_block(
        self: &Arc<Self>,
        reward_to: Option<&Recipient>,
    ) -> Result<Option<Hash>, BlockchainError> {
        if self.creating_block.swap(true, Ordering::SeqCst) {
            return Err(BlockchainError::AlreadyMining);
        }
        let _creating = CreatingGuard(&self.creating_block);

        // A voluntary creation cancels any still-pending auto-create timer
        if let Some(handle) = self.auto_create.lock().await.take() {
            handle.abort();
        }

        let mut blocks = self.blocks.write().await;
        let mut contracts = self.contracts.write().await;
        let mut pending_contracts = self.pending_contracts.write().await;
        let taken = self.mempool.write().await.take();
        let total_taken = taken.len();

        let mut running: HashMap<Address, i128> = HashMap::new();
        let mut preflights: HashMap<Hash, CallOutcome> = HashMap::new();
        let mut kept: Vec<(usize, Transaction)> = Vec::new();
        let mut dropped: Vec<(usize, Transaction)> = Vec::new();

        for (index, mut tx) in taken.into_iter().enumerate() {
            if !tx.verify() {
                debug!("dropping {}: invalid signature", tx.get_hash());
                dropped.push((index, tx));
                continue;
            }
            let Some(from_address) = tx.get_from().map(|r| r.get_address().clone()) else {
                dropped.push((index, tx));
                continue;
            };
            let to_address = tx.get_to().get_address().clone();

            // Preflight contract calls to learn gas use and storage effects
            if tx.get_type() == TransactionType::ContractCall {
                let Some(address) = tx.get_contract().cloned() else {
                    debug!("dropping {}: call without a contract", tx.get_hash());
                    dropped.push((index, tx));
                    continue;
                };
                let contract_balance = (*running
                    .entry(address.clone())
                    .or_insert_with(|| Self::balance_in(&blocks, &address)))
                .max(0) as u64;
                let Some(contract) = contracts.get_mut(&address) else {
                    debug!(
                        "dropping {}: contract {} not registered",
                        tx.get_hash(),
                        address
                    );
                    dropped.push((index, tx));
                    continue;
                };
                let request = CallRequest {
                    caller: from_address.clone(),
                    value: tx.get_amount(),
                    gas_limit: tx.get_gas_limit().unwrap_or(DEFAULT_GAS_LIMIT),
                    function: tx.get_function_name().unwrap_or_default().to_string(),
                    args: tx.get_function_args().to_vec(),
                    contract_balance,
                    drain: self.drain.get_address().clone(),
                };
                let outcome = runtime::execute_call(contract, request);
                tx.set_gas_used(outcome.result.gas_used);
                tx.set_call_result(outcome.result.clone());
                preflights.insert(tx.get_hash().clone(), outcome);
            }

            let spending = match tx.get_type() {
                TransactionType::ContractDeploy => tx.get_amount(),
                TransactionType::ContractCall => tx.get_amount() + tx.gas_cost(),
                _ => tx.total_amount(),
            };
            let amount = tx.get_amount();

            // Tentatively move the funds on the running balances
            *running
                .entry(from_address.clone())
                .or_insert_with(|| Self::balance_in(&blocks, &from_address)) -= spending as i128;
            *running
                .entry(to_address.clone())
                .or_insert_with(|| Self::balance_in(&blocks, &to_address)) += amount as i128;

            if running[&from_address] < 0 {
                // Roll the move back; earlier transactions keep their claim
                *running.entry(from_address.clone()).or_default() += spending as i128;
                *running.entry(to_address.clone()).or_default() -= amount as i128;

                if tx.get_type() == TransactionType::ContractCall {
                    let gas = tx.gas_cost() as i128;
                    if running[&from_address] >= gas {
                        // Sender can at least pay the gas: keep the call as
                        // a pure gas charge with no state effect
                        revert_preflight(&mut contracts, &mut preflights, &tx);
                        tx.downgrade_to_gas_only();
                        *running.entry(from_address.clone()).or_default() -= gas;
                        debug!("downgrading {} to gas-only", tx.get_hash());
                        kept.push((index, tx));
                        continue;
                    }
                }

                revert_preflight(&mut contracts, &mut preflights, &tx);
                debug!(
                    "dropping {}: insufficient funds for {}",
                    tx.get_hash(),
                    spending
                );
                dropped.push((index, tx));
                continue;
            }

            kept.push((index, tx));
        }

        if kept.is_empty() {
            self.mempool
                .write()
                .await
                .restore(dropped.into_iter().map(|(_, tx)| tx).collect());
            info!("no eligible transactions, block creation aborted");
            return Ok(None);
        }

        // Resolve the reward target; PoS selects its validator up front so
        // the reward and fees transactions can name it
        let (reward_recipient, validator) = match &self.consensus {
            Consensus::ProofOfWork { .. } => (
                reward_to
                    .cloned()
                    .unwrap_or_else(|| self.drain.recipient()),
                None,
            ),
            Consensus::ProofOfStake { stakes } => {
                let validator = stakes.read().await.select_validator(&self.faucet);
                (validator.recipient(), Some(validator))
            }
        };

        // Turn the transfers requested by successful calls into internal
        // withdrawals, funds permitting; otherwise discard the call effects
        let mut withdrawals: Vec<Transaction> = Vec::new();
        for (_, tx) in kept.iter() {
            if tx.get_type() != TransactionType::ContractCall {
                continue;
            }
            let Some(outcome) = preflights.get_mut(tx.get_hash()) else {
                continue;
            };
            if !outcome.result.success || outcome.transfers.is_empty() {
                continue;
            }
            let Some(contract_address) = tx.get_contract().cloned() else {
                continue;
            };

            let requested: u64 = outcome.transfers.iter().map(|t| t.amount).sum();
            let available = *running
                .entry(contract_address.clone())
                .or_insert_with(|| Self::balance_in(&blocks, &contract_address));
            if available < requested as i128 {
                warn!(
                    "contract {} holds {} of {} requested, discarding call effects",
                    contract_address, available, requested
                );
                if let Some(snapshot) = outcome.snapshot.take() {
                    if let Some(contract) = contracts.get_mut(&contract_address) {
                        contract.restore_storage(snapshot);
                    }
                }
                outcome.transfers.clear();
                continue;
            }

            let contract_recipient = contracts
                .get(&contract_address)
                .map(|contract| contract.recipient())
                .unwrap_or_else(|| Recipient::from_address(contract_address.clone()));
            for transfer in outcome.transfers.drain(..) {
                *running.entry(contract_address.clone()).or_default() -=
                    transfer.amount as i128;
                *running
                    .entry(transfer.to.clone())
                    .or_insert_with(|| Self::balance_in(&blocks, &transfer.to)) +=
                    transfer.amount as i128;
                withdrawals.push(Transaction::withdrawal(
                    contract_recipient.clone(),
                    Recipient::from_address(transfer.to),
                    transfer.amount,
                ));
            }
        }

        let reward_amount = kept.len() as u64 * REWARD_PER_MINED_TRANSACTION;
        let fees_amount: u64 = kept
            .iter()
            .map(|(_, tx)| tx.fee_part() + tx.gas_cost())
            .sum();

        let mut data = Vec::with_capacity(2 + kept.len() + withdrawals.len());
        data.push(Transaction::reward(reward_recipient.clone(), reward_amount));
        data.push(Transaction::fees(reward_recipient.clone(), fees_amount));
        data.extend(kept.iter().map(|(_, tx)| tx.clone()));
        data.extend(withdrawals);

        let previous_hash = blocks
            .last()
            .map(|block| block.get_hash().clone())
            .ok_or_else(|| {
                BlockchainError::InvariantViolation("chain has no genesis block".to_string())
            })?;
        let mut block = Block::new(previous_hash, data)?;

        // Seal the block. A failed PoW search aborts the whole attempt:
        // preflighted storage is reverted and the mempool fully restored,
        // keeping contract state transitions atomic with the commit.
        match &self.consensus {
            Consensus::ProofOfWork { difficulty } => {
                if let Err(e) = block.mine(*difficulty).await {
                    for (_, tx) in kept.iter() {
                        revert_preflight(&mut contracts, &mut preflights, tx);
                    }
                    let mut all: Vec<(usize, Transaction)> =
                        kept.into_iter().chain(dropped).collect();
                    all.sort_by_key(|(index, _)| *index);
                    self.mempool
                        .write()
                        .await
                        .restore(all.into_iter().map(|(_, tx)| tx).collect());
                    return Err(e.into());
                }
            }
            Consensus::ProofOfStake { .. } => {
                if let Some(validator) = &validator {
                    block.sign(validator);
                }
            }
        }

        // Commit: register deployed contracts and run their constructors
        for (_, tx) in kept.iter() {
            if tx.get_type() != TransactionType::ContractDeploy {
                continue;
            }
            let Some(address) = tx.get_contract() else {
                continue;
            };
            let Some(mut contract) = pending_contracts.shift_remove(address) else {
                warn!("deploy of {} has no pending contract", address);
                continue;
            };
            let Some(creator) = tx.get_from() else {
                continue;
            };
            match runtime::run_init(&mut contract, creator.get_address(), self.drain.get_address())
            {
                Ok(()) => {
                    info!("contract {} ({}) registered", contract.get_name(), address);
                    contracts.insert(address.clone(), contract);
                }
                Err(e) => {
                    warn!("contract {} init failed, not registered: {}", address, e);
                }
            }
        }

        // Commit: move committed stakes into the ledger
        if let Consensus::ProofOfStake { stakes } = &self.consensus {
            let mut ledger = stakes.write().await;
            for (_, tx) in kept.iter() {
                match tx.get_type() {
                    TransactionType::Stake => {
                        if let Some(from) = tx.get_from() {
                            ledger.credit(from.get_address(), tx.get_amount());
                        }
                    }
                    TransactionType::Unstake => {
                        ledger.debit(tx.get_to().get_address(), tx.get_amount());
                    }
                    _ => {}
                }
            }
        }

        let block_hash = block.get_hash().clone();
        info!(
            "block {} committed: {} of {} mempool transactions, {} total, reward {} to {}",
            block_hash,
            kept.len(),
            total_taken,
            block.get_txs_count(),
            reward_amount,
            reward_recipient.get_name()
        );
        blocks.push(block);
        self.mempool
            .write()
            .await
            .restore(dropped.into_iter().map(|(_, tx)| tx).collect());

        Ok(Some(block_hash))
    }
}

// Undo the storage effects of a preflighted call and forget its transfers
fn revert_preflight(
    contracts: &mut IndexMap<Address, Contract>,
    preflights: &mut HashMap<Hash, CallOutcome>,
    tx: &Transaction,
) {
    let Some(outcome) = preflights.get_mut(tx.get_hash()) else {
        return;
    };
    if let Some(snapshot) = outcome.snapshot.take() {
        if let Some(address) = tx.get_contract() {
            if let Some(contract) = contracts.get_mut(address) {
                contract.restore_storage(snapshot);
            }
        }
    }
    outcome.transfers.clear();
}
