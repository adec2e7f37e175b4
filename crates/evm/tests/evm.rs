//! Stand-ins on a real EVM, next to hand-assembled contracts.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{hex, Address, Bytes, U256};
use alloy_sol_types::SolValue;
use doppel_client::{parse_abi, Backend, Contract, DeployOptions, MockContract};
use doppel_core::wire::{decode_relay_output, RelayKind, RelayRequest};
use doppel_core::{AdminCall, DoppelError, DoppelResult, DEFAULT_REVERT_REASON, NOT_INITIALIZED};
use doppel_evm::{EvmChain, EvmConfig, TX_GAS_LIMIT_CAP};
use doppel_runtime::STAND_IN_CODE;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Bytecode fixtures
// ---------------------------------------------------------------------------

/// Returns `msg.sender` as one word.
const RETURN_CALLER: &[u8] = &hex!("3360005260206000f3");

/// Increments slot 0 and returns the new value.
const INCREMENTER: &[u8] = &hex!("6000546001018060005560005260206000f3");

/// Reverts with its own call data.
const REVERTER: &[u8] = &hex!("366000600037366000fd");

/// Forwards its call data to `target` and bubbles up the result.
fn forwarder(target: Address) -> Bytes {
    let mut code = hex!("36600060003760006000366000600073").to_vec();
    code.extend_from_slice(target.as_slice());
    code.extend_from_slice(&hex!("5af13d600060003e6033573d6000fd5b3d6000f3"));
    code.into()
}

/// Forwards its call data to `target`, then reverts whatever happened.
fn call_then_revert(target: Address) -> Bytes {
    let mut code = hex!("36600060003760006000366000600073").to_vec();
    code.extend_from_slice(target.as_slice());
    code.extend_from_slice(&hex!("5af15060006000fd"));
    code.into()
}

/// Forwards its call data to `target`, ignores the result and stops.
fn call_and_ignore(target: Address) -> Bytes {
    let mut code = hex!("36600060003760006000366000600073").to_vec();
    code.extend_from_slice(target.as_slice());
    code.extend_from_slice(&hex!("5af15000"));
    code.into()
}

/// Init code that deploys [`RETURN_CALLER`].
fn return_caller_init() -> Bytes {
    let mut code = vec![0x68];
    code.extend_from_slice(RETURN_CALLER);
    code.extend_from_slice(&hex!("60005260096017f3"));
    code.into()
}

const ORACLE: &str = r#"
    function read() view returns (uint256)
    function add(uint256 value) returns (uint256)
    function deposit() payable returns (bool)
"#;

fn uint(n: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(n), 256)
}

fn word(n: u64) -> Bytes {
    U256::from(n).abi_encode().into()
}

async fn setup() -> (EvmChain, MockContract<EvmChain>) {
    let chain = EvmChain::new();
    let mock = MockContract::deploy(Arc::new(chain.clone()), parse_abi(ORACLE).unwrap(), DeployOptions::default())
        .await
        .unwrap();
    (chain, mock)
}

// ---------------------------------------------------------------------------
// Contracts calling stand-ins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn contract_sees_programmed_return() -> DoppelResult<()> {
    let (chain, mut mock) = setup().await;
    let proxy = chain.deploy_code(forwarder(mock.address()))?;
    let read = mock.contract().encode_call("read", &[])?;

    mock.stub("read")?.returns([uint(7)])?.await?;
    assert_eq!(chain.transact(proxy, read, U256::ZERO)?, word(7));
    Ok(())
}

#[tokio::test]
async fn contract_sees_unprogrammed_revert() -> DoppelResult<()> {
    let (chain, mock) = setup().await;
    let proxy = chain.deploy_code(forwarder(mock.address()))?;
    let read = mock.contract().encode_call("read", &[])?;

    let err = chain.transact(proxy, read, U256::ZERO).unwrap_err();
    assert_eq!(err.revert_reason(), Some(NOT_INITIALIZED));
    Ok(())
}

#[tokio::test]
async fn queue_advances_across_transactions() -> DoppelResult<()> {
    let (chain, mut mock) = setup().await;
    let proxy = chain.deploy_code(forwarder(mock.address()))?;
    let read = mock.contract().encode_call("read", &[])?;

    mock.stub("read")?.returns([uint(1)])?.returns([uint(2)])?.reverts()?.await?;

    assert_eq!(chain.transact(proxy, read.clone(), U256::ZERO)?, word(1));
    assert_eq!(chain.transact(proxy, read.clone(), U256::ZERO)?, word(2));
    for _ in 0..2 {
        let err = chain.transact(proxy, read.clone(), U256::ZERO).unwrap_err();
        assert_eq!(err.revert_reason(), Some(DEFAULT_REVERT_REASON));
    }
    Ok(())
}

#[tokio::test]
async fn exact_arguments_win_over_selector() -> DoppelResult<()> {
    let (chain, mut mock) = setup().await;
    let proxy = chain.deploy_code(forwarder(mock.address()))?;

    mock.stub("add")?.with_args([uint(1)])?.returns([uint(1)])?.await?;
    mock.stub("add")?.with_args([uint(2)])?.returns([uint(2)])?.await?;

    let add = |n| mock.contract().encode_call("add", &[uint(n)]);
    assert_eq!(chain.transact(proxy, add(1)?, U256::ZERO)?, word(1));
    assert_eq!(chain.transact(proxy, add(2)?, U256::ZERO)?, word(2));
    let err = chain.transact(proxy, add(3)?, U256::ZERO).unwrap_err();
    assert_eq!(err.revert_reason(), Some(NOT_INITIALIZED));
    Ok(())
}

#[tokio::test]
async fn static_invocation_leaves_queue_untouched() -> DoppelResult<()> {
    let (_chain, mut mock) = setup().await;
    mock.stub("read")?.returns([uint(1)])?.returns([uint(2)])?.await?;

    assert_eq!(mock.invoke_static("read", &[]).await?, uint(1));
    assert_eq!(mock.invoke("read", &[]).await?, uint(1));
    assert_eq!(mock.invoke("read", &[]).await?, uint(2));
    Ok(())
}

#[tokio::test]
async fn reverted_transaction_rolls_back_queue_pops() -> DoppelResult<()> {
    let (chain, mut mock) = setup().await;
    let reverting = chain.deploy_code(call_then_revert(mock.address()))?;
    let read = mock.contract().encode_call("read", &[])?;

    mock.stub("read")?.returns([uint(1)])?.returns([uint(2)])?.await?;

    assert!(chain.transact(reverting, read, U256::ZERO).unwrap_err().is_revert());
    assert_eq!(mock.invoke("read", &[]).await?, uint(1));
    Ok(())
}

#[tokio::test]
async fn reverted_inner_frame_rolls_back_queue_pops() -> DoppelResult<()> {
    let (chain, mut mock) = setup().await;
    let reverting = chain.deploy_code(call_then_revert(mock.address()))?;
    let swallowing = chain.deploy_code(call_and_ignore(reverting))?;
    let read = mock.contract().encode_call("read", &[])?;

    mock.stub("read")?.returns([uint(1)])?.returns([uint(2)])?.await?;

    chain.transact(swallowing, read, U256::ZERO)?;
    assert_eq!(mock.invoke("read", &[]).await?, uint(1));
    assert_eq!(mock.invoke("read", &[]).await?, uint(2));
    Ok(())
}

#[tokio::test]
async fn stubbed_call_keeps_its_value() -> DoppelResult<()> {
    let (chain, mut mock) = setup().await;
    let sender = chain.sender()?;
    chain.set_balance(sender, U256::from(1_000))?;
    let deposit = mock.contract().encode_call("deposit", &[])?;

    mock.stub("deposit")?.returns([DynSolValue::Bool(true)])?.await?;

    assert_eq!(chain.transact(mock.address(), deposit, U256::from(7))?, word(1));
    assert_eq!(chain.balance(mock.address())?, U256::from(7));
    assert_eq!(chain.balance(sender)?, U256::from(993));
    Ok(())
}

#[tokio::test]
async fn contract_can_drive_the_relay() -> DoppelResult<()> {
    let (chain, mock) = setup().await;
    let proxy = chain.deploy_code(forwarder(mock.address()))?;
    let whoami = chain.deploy_code(RETURN_CALLER)?;
    let relay = AdminCall::Relay(RelayRequest {
        target: whoami,
        data: Bytes::new(),
        kind: RelayKind::Call,
    })
    .encode();

    let out = chain.transact(proxy, relay, U256::ZERO)?;
    let inner = decode_relay_output(&out)?;
    assert_eq!(Address::abi_decode(&inner).ok(), Some(mock.address()));
    Ok(())
}

#[tokio::test]
async fn default_gas_limit_fits_the_transaction_cap() -> DoppelResult<()> {
    assert_eq!(EvmConfig::default().gas_limit, TX_GAS_LIMIT_CAP);

    let chain = EvmChain::with_config(EvmConfig {
        gas_limit: 30_000_000,
        ..EvmConfig::default()
    });
    let address = chain.deploy_code(RETURN_CALLER)?;
    let out = chain.transact(address, Bytes::new(), U256::ZERO)?;
    assert_eq!(Address::abi_decode(&out).ok(), Some(chain.sender()?));
    Ok(())
}

// ---------------------------------------------------------------------------
// Stand-ins calling contracts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relay_calls_with_stand_in_identity() -> DoppelResult<()> {
    let (chain, mock) = setup().await;
    let target = Contract::new(
        chain.deploy_code(RETURN_CALLER)?,
        parse_abi("function whoami() view returns (address)")?,
    );

    assert_eq!(
        mock.staticcall(&target, "whoami", &[]).await?,
        DynSolValue::Address(mock.address())
    );
    let raw = mock.call(&target, "whoami", &[]).await?;
    assert_eq!(Address::abi_decode(&raw).ok(), Some(mock.address()));
    Ok(())
}

#[tokio::test]
async fn relay_call_persists_and_staticcall_cannot_write() -> DoppelResult<()> {
    let (chain, mock) = setup().await;
    let counter = Contract::new(
        chain.deploy_code(INCREMENTER)?,
        parse_abi("function increment() returns (uint256)")?,
    );

    assert_eq!(mock.call(&counter, "increment", &[]).await?, word(1));
    assert_eq!(mock.call(&counter, "increment", &[]).await?, word(2));
    assert_eq!(chain.storage(counter.address, U256::ZERO)?, U256::from(2));

    let err = mock.staticcall(&counter, "increment", &[]).await.unwrap_err();
    assert!(err.is_revert());
    assert_eq!(err.revert_reason(), None);
    assert_eq!(chain.storage(counter.address, U256::ZERO)?, U256::from(2));
    Ok(())
}

#[tokio::test]
async fn relay_passes_revert_data_through() -> DoppelResult<()> {
    let (chain, mock) = setup().await;
    let reverter = Contract::new(
        chain.deploy_code(REVERTER)?,
        parse_abi("function fail(string reason)")?,
    );
    let args = [DynSolValue::String("boom".into())];
    let expected = reverter.encode_call("fail", &args)?;

    match mock.call(&reverter, "fail", &args).await {
        Err(DoppelError::Reverted { reason, data }) => {
            assert_eq!(reason, None);
            assert_eq!(data, expected);
        }
        other => panic!("expected revert, got {other:?}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Value transfers and deployment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receive_accepts_value_until_programmed_to_revert() -> DoppelResult<()> {
    let (chain, mock) = setup().await;
    chain.set_balance(chain.sender()?, U256::from(1_000))?;

    chain.send_value(mock.address(), U256::from(10)).await?;
    assert_eq!(chain.balance(mock.address())?, U256::from(10));

    mock.receive().reverts_with_reason("no deposits").await?;
    let err = chain.send_value(mock.address(), U256::from(10)).await.unwrap_err();
    assert_eq!(err.revert_reason(), Some("no deposits"));
    assert_eq!(chain.balance(mock.address())?, U256::from(10));
    Ok(())
}

#[tokio::test]
async fn fixed_address_install_respects_override() -> DoppelResult<()> {
    let chain = Arc::new(EvmChain::new());
    let target = Address::repeat_byte(0x77);
    chain.set_code(target, RETURN_CALLER)?;

    let err = MockContract::deploy(Arc::clone(&chain), parse_abi(ORACLE)?, DeployOptions::at(target))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DoppelError::AddressOccupied(a) if a == target));

    let mut mock = MockContract::deploy(
        Arc::clone(&chain),
        parse_abi(ORACLE)?,
        DeployOptions::at(target).with_override(true),
    )
    .await?;
    assert_eq!(chain.code_at(target).await?.as_ref(), STAND_IN_CODE);

    mock.stub("read")?.returns([uint(3)])?.await?;
    assert_eq!(mock.invoke("read", &[]).await?, uint(3));
    Ok(())
}

#[tokio::test]
async fn creation_runs_init_code() -> DoppelResult<()> {
    let chain = EvmChain::new();
    let address = chain.create(return_caller_init())?;
    assert_eq!(chain.code_at(address).await?.as_ref(), RETURN_CALLER);

    let out = chain.transact(address, Bytes::new(), U256::ZERO)?;
    assert_eq!(Address::abi_decode(&out).ok(), Some(chain.sender()?));
    Ok(())
}
