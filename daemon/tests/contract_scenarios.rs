//! Contract deployment, gas-metered calls and payable withdrawals.

use std::sync::Arc;

use abacus_common::{
    account::Wallet,
    config::{
        COIN_VALUE, DEFAULT_FEE_PERCENTAGE, GAS_COST_CONTRACT_CALL, GAS_COST_STORAGE_READ,
        GAS_COST_STORAGE_WRITE, GAS_PRICE,
    },
    contract::{Contract, ContractError},
    crypto::Address,
    transaction::{Transaction, TransactionType},
};
use abacus_daemon::core::{Blockchain, BlockchainError, CallOptions, Consensus};
use serde_json::json;

fn counter(creator: &Wallet) -> Contract {
    Contract::builder("Counter", creator.recipient())
        .storage("count", json!(0))
        .function("__init__", |ctx, _| {
            let owner = ctx.msg().sender.as_str().to_string();
            ctx.set("owner", json!(owner))?;
            Ok(json!(null))
        })
        .function("increment", |ctx, args| {
            let step = args.first().and_then(|v| v.as_u64()).unwrap_or(1);
            let count = ctx.get("count")?.and_then(|v| v.as_u64()).unwrap_or(0);
            let next = count + step;
            ctx.set("count", json!(next))?;
            Ok(json!(next))
        })
        .view("get_count", |view, _| Ok(view.get("count").unwrap_or(json!(0))))
        .view("get_owner", |view, _| Ok(view.get("owner").unwrap_or(json!(null))))
        .build()
}

fn bank(creator: &Wallet) -> Contract {
    Contract::builder("Bank", creator.recipient())
        .function("deposit", |_, _| Ok(json!(null)))
        .function("withdraw", |ctx, args| {
            let to = args
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| ContractError::MissingData("target address".to_string()))?;
            let amount = args
                .get(1)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| ContractError::MissingData("amount".to_string()))?;
            if amount > ctx.env().contract_balance {
                return Err(ContractError::Reverted("insufficient funds".to_string()));
            }
            let target = Address::from_string(to)
                .map_err(|e| ContractError::MissingData(e.to_string()))?;
            ctx.emit_transfer(target, amount);
            Ok(json!(null))
        })
        .build()
}

async fn funded_chain(wallet: &Wallet, coins: u64) -> anyhow::Result<Arc<Blockchain>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let chain = Blockchain::new(Consensus::proof_of_work()).await?;
    let faucet = Arc::clone(chain.get_faucet());
    chain
        .add_transaction(Transaction::transfer(
            &faucet,
            wallet.recipient(),
            coins * COIN_VALUE,
            DEFAULT_FEE_PERCENTAGE,
        ))
        .await?;
    chain.create_block(None).await?;
    Ok(chain)
}

#[tokio::test]
async fn deploy_and_call_counter() -> anyhow::Result<()> {
    let alice = Wallet::new("Alice");
    let chain = funded_chain(&alice, 50).await?;

    let address = chain.deploy_contract(&alice, counter(&alice)).await?;
    assert!(!chain.is_contract_registered(&address).await);

    chain.create_block(None).await?;
    assert!(chain.is_contract_registered(&address).await);
    assert_eq!(
        chain.view_contract(&address, "get_owner", &[]).await?,
        json!(alice.get_address().as_str())
    );

    let before_call = chain.get_balance(alice.get_address()).await;
    chain
        .invoke_contract(&alice, &address, "increment", vec![json!(5)], CallOptions::default())
        .await?;
    chain.create_block(None).await?;

    assert_eq!(
        chain.view_contract(&address, "get_count", &[]).await?,
        json!(5)
    );
    // Off-chain views have no chain effect
    assert_eq!(
        chain.view_contract(&address, "get_count", &[]).await?,
        json!(5)
    );

    // One base charge, one read, one write
    let expected_gas = GAS_COST_CONTRACT_CALL + GAS_COST_STORAGE_READ + GAS_COST_STORAGE_WRITE;
    let block = chain.get_block_at(3).await.expect("call block");
    let call = block
        .get_transactions()
        .iter()
        .find(|tx| tx.get_type() == TransactionType::ContractCall)
        .expect("committed call");
    assert_eq!(call.get_gas_used(), Some(expected_gas));
    assert!(call.get_gas_used() <= call.get_gas_limit());
    assert!(call.get_call_result().expect("preflight result").success);
    assert_eq!(
        chain.get_balance(alice.get_address()).await,
        before_call - expected_gas * GAS_PRICE
    );

    chain.validate_integrity().await?;
    Ok(())
}

#[tokio::test]
async fn out_of_gas_charges_the_limit_and_reverts() -> anyhow::Result<()> {
    let alice = Wallet::new("Alice");
    let chain = funded_chain(&alice, 50).await?;

    let address = chain.deploy_contract(&alice, counter(&alice)).await?;
    chain.create_block(None).await?;

    let before = chain.get_balance(alice.get_address()).await;
    // The base cost fits, any storage access trips the limit
    chain
        .invoke_contract(
            &alice,
            &address,
            "increment",
            vec![json!(5)],
            CallOptions {
                value: 0,
                gas_limit: GAS_COST_CONTRACT_CALL,
            },
        )
        .await?;
    chain.create_block(None).await?;

    let block = chain.get_block_at(3).await.expect("call block");
    let call = block
        .get_transactions()
        .iter()
        .find(|tx| tx.get_type() == TransactionType::ContractCall)
        .expect("committed call");
    let result = call.get_call_result().expect("preflight result");
    assert!(!result.success);
    assert_eq!(result.gas_used, GAS_COST_CONTRACT_CALL);

    // Storage untouched, caller charged the full limit
    assert_eq!(
        chain.view_contract(&address, "get_count", &[]).await?,
        json!(0)
    );
    assert_eq!(
        chain.get_balance(alice.get_address()).await,
        before - GAS_COST_CONTRACT_CALL * GAS_PRICE
    );
    Ok(())
}

#[tokio::test]
async fn payable_call_funds_contract_withdrawals() -> anyhow::Result<()> {
    let alice = Wallet::new("Alice");
    let bob = Wallet::new("Bob");
    let chain = funded_chain(&alice, 50).await?;

    let address = chain.deploy_contract(&alice, bank(&alice)).await?;
    chain.create_block(None).await?;

    chain
        .invoke_contract(
            &alice,
            &address,
            "deposit",
            vec![],
            CallOptions {
                value: 5 * COIN_VALUE,
                ..CallOptions::default()
            },
        )
        .await?;
    chain.create_block(None).await?;
    assert_eq!(chain.get_balance(&address).await, 5 * COIN_VALUE);

    chain
        .invoke_contract(
            &alice,
            &address,
            "withdraw",
            vec![json!(bob.get_address().as_str()), json!(2 * COIN_VALUE)],
            CallOptions::default(),
        )
        .await?;
    chain.create_block(None).await?;

    assert_eq!(chain.get_balance(&address).await, 3 * COIN_VALUE);
    assert_eq!(chain.get_balance(bob.get_address()).await, 2 * COIN_VALUE);

    // The transfer rides in an unsigned internal withdrawal
    let block = chain.get_block_at(4).await.expect("withdrawal block");
    let withdrawal = block
        .get_transactions()
        .iter()
        .find(|tx| tx.get_type() == TransactionType::Withdrawal)
        .expect("withdrawal transaction");
    assert_eq!(withdrawal.get_amount(), 2 * COIN_VALUE);
    assert_eq!(
        withdrawal.get_from().map(|r| r.get_address()),
        Some(&address)
    );
    assert!(withdrawal.get_signature().is_none());

    chain.validate_integrity().await?;
    Ok(())
}

#[tokio::test]
async fn call_waits_for_contract_registration() -> anyhow::Result<()> {
    let alice = Wallet::new("Alice");
    let chain = funded_chain(&alice, 50).await?;

    // Deploy and call land in the same mempool; the call must wait for
    // the block that registers the contract
    let address = chain.deploy_contract(&alice, counter(&alice)).await?;
    let call_hash = chain
        .invoke_contract(&alice, &address, "increment", vec![json!(2)], CallOptions::default())
        .await?;

    chain.create_block(None).await?;
    assert!(chain.is_contract_registered(&address).await);
    assert!(chain.mempool_contains(&call_hash).await);
    assert_eq!(
        chain.view_contract(&address, "get_count", &[]).await?,
        json!(0)
    );

    chain.create_block(None).await?;
    assert!(!chain.mempool_contains(&call_hash).await);
    assert_eq!(
        chain.view_contract(&address, "get_count", &[]).await?,
        json!(2)
    );
    Ok(())
}

#[tokio::test]
async fn unknown_contract_is_rejected() -> anyhow::Result<()> {
    let alice = Wallet::new("Alice");
    let chain = funded_chain(&alice, 5).await?;

    let missing = Address::from_hash(&abacus_common::crypto::hash(b"nowhere"));
    let result = chain
        .invoke_contract(&alice, &missing, "anything", vec![], CallOptions::default())
        .await;
    assert!(matches!(result, Err(BlockchainError::UnknownContract(_))));

    let view = chain.view_contract(&missing, "anything", &[]).await;
    assert!(matches!(view, Err(BlockchainError::UnknownContract(_))));
    Ok(())
}

#[tokio::test]
async fn deploy_requires_the_creator_wallet() -> anyhow::Result<()> {
    let alice = Wallet::new("Alice");
    let mallory = Wallet::new("Mallory");
    let chain = funded_chain(&mallory, 50).await?;

    let result = chain.deploy_contract(&mallory, counter(&alice)).await;
    assert!(matches!(result, Err(BlockchainError::Ownership)));
    Ok(())
}

#[tokio::test]
async fn unaffordable_value_downgrades_to_gas_only() -> anyhow::Result<()> {
    let alice = Wallet::new("Alice");
    let chain = funded_chain(&alice, 2).await?;

    let address = chain.deploy_contract(&alice, bank(&alice)).await?;
    chain.create_block(None).await?;

    let before = chain.get_balance(alice.get_address()).await;
    // Alice can pay the gas but not the attached value
    chain
        .invoke_contract(
            &alice,
            &address,
            "deposit",
            vec![],
            CallOptions {
                value: 5 * COIN_VALUE,
                ..CallOptions::default()
            },
        )
        .await?;
    chain.create_block(None).await?;

    let block = chain.get_block_at(3).await.expect("gas-only block");
    let gas_only = block
        .get_transactions()
        .iter()
        .find(|tx| tx.get_type() == TransactionType::GasOnly)
        .expect("downgraded call");
    let gas_used = gas_only.get_gas_used().expect("metered gas");

    // Only the gas moved: no deposit reached the contract
    assert_eq!(chain.get_balance(&address).await, 0);
    assert_eq!(
        chain.get_balance(alice.get_address()).await,
        before - gas_used * GAS_PRICE
    );
    Ok(())
}
