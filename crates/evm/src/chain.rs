//! `EvmChain`: an in-memory `revm` chain that hosts stand-ins.
//!
//! Real contracts run as EVM bytecode against a `CacheDB<EmptyDB>`.
//! Stand-ins carry a one-byte `STOP` placeholder in the database and are
//! answered by [`StandInInspector`] whenever a frame targets them.

use alloy_primitives::{address, Address, Bytes, U256};
use async_trait::async_trait;
use doppel_client::{Backend, DEFAULT_SENDER};
use doppel_core::{AdminCall, DoppelError, DoppelResult};
use doppel_runtime::relay::{self, CallFailure, CallHost};
use doppel_runtime::{Outcome, StandIn, STAND_IN_CODE};
use revm::context::result::{ExecutionResult, Output};
use revm::context::{Context, TxEnv};
use revm::database::{CacheDB, EmptyDB};
use revm::database_interface::{DatabaseCommit, DatabaseRef};
use revm::handler::{ExecuteEvm, MainBuilder, MainContext};
use revm::inspector::InspectEvm;
use revm::primitives::TxKind;
use revm::state::{AccountInfo, Bytecode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::inspector::StandInInspector;

/// Account whose nonce numbers the addresses handed out by
/// [`EvmChain::deploy_code`] and fresh stand-in deployments.
const DEPLOYER: Address = address!("00000000000000000000000000000000d0bbe1de");

/// EIP-7825 per-transaction gas cap.
pub const TX_GAS_LIMIT_CAP: u64 = 16_777_216;

/// Chain parameters.
#[derive(Debug, Clone)]
pub struct EvmConfig {
    pub sender: Address,
    /// Gas limit of every transaction. Values above [`TX_GAS_LIMIT_CAP`]
    /// are allowed; the cap is lifted to match.
    pub gas_limit: u64,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            sender: DEFAULT_SENDER,
            gas_limit: TX_GAS_LIMIT_CAP,
        }
    }
}

// ---------------------------------------------------------------------------
// World state
// ---------------------------------------------------------------------------

struct World {
    db: CacheDB<EmptyDB>,
    stand_ins: HashMap<Address, StandIn>,
    config: EvmConfig,
    deploy_nonce: u64,
    static_depth: usize,
}

impl World {
    fn new(config: EvmConfig) -> Self {
        Self {
            db: CacheDB::new(EmptyDB::new()),
            stand_ins: HashMap::new(),
            config,
            deploy_nonce: 0,
            static_depth: 0,
        }
    }

    fn account(&self, address: Address) -> AccountInfo {
        self.db.basic_ref(address).ok().flatten().unwrap_or_default()
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        let current = self.account(address);
        let bytecode = Bytecode::new_raw(code);
        let info = AccountInfo::new(current.balance, current.nonce, bytecode.hash_slow(), bytecode);
        self.db.insert_account_info(address, info);
    }

    fn code_at(&self, address: Address) -> Bytes {
        let info = self.account(address);
        match info.code {
            Some(code) => code.original_bytes(),
            None => self
                .db
                .code_by_hash_ref(info.code_hash)
                .map(|code| code.original_bytes())
                .unwrap_or_default(),
        }
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        let mut info = self.account(address);
        info.balance = balance;
        self.db.insert_account_info(address, info);
    }

    fn next_address(&mut self) -> Address {
        let address = DEPLOYER.create(self.deploy_nonce);
        self.deploy_nonce += 1;
        address
    }

    fn install_stand_in(&mut self, address: Address) {
        self.set_code(address, Bytes::from_static(STAND_IN_CODE));
        self.stand_ins.insert(address, StandIn::new(address));
    }

    /// Runs one transaction, committing its state unless inside a static call.
    ///
    /// Inside a static call the entry frame runs in static mode, so the
    /// target cannot write state.
    fn execute(&mut self, caller: Address, kind: TxKind, data: Bytes, value: U256) -> DoppelResult<ExecutionResult> {
        let tx = TxEnv::builder()
            .caller(caller)
            .kind(kind)
            .data(data)
            .value(value)
            .gas_limit(self.config.gas_limit)
            .build()
            .map_err(|e| DoppelError::Evm(format!("Failed to build TxEnv: {e:?}")))?;

        let mut ctx = Context::mainnet()
            .with_db(CacheDB::new(&self.db))
            .with_tx(TxEnv::default());

        ctx.cfg.disable_nonce_check = true;
        ctx.cfg.disable_balance_check = true;
        ctx.cfg.disable_block_gas_limit = true;
        ctx.cfg.disable_base_fee = true;
        ctx.cfg.disable_eip3607 = true;
        ctx.cfg.tx_gas_limit_cap = Some(self.config.gas_limit.max(TX_GAS_LIMIT_CAP));

        let inspector = StandInInspector::new(&mut self.stand_ins).with_static_entry(self.static_depth > 0);
        let mut evm = ctx.build_mainnet_with_inspector(inspector);

        let result = evm
            .inspect_one_tx(tx)
            .map_err(|e| DoppelError::Evm(format!("{e:?}")))?;
        let state = evm.finalize();
        let intercepted = evm.inspector.intercepted;
        drop(evm);

        tracing::debug!(
            %caller,
            gas_used = result.gas_used(),
            success = result.is_success(),
            intercepted,
            "evm execution"
        );

        if self.static_depth == 0 {
            self.db.commit(state);
        }
        Ok(result)
    }

    fn message_call(&mut self, caller: Address, target: Address, data: Bytes, value: U256) -> Result<Bytes, CallFailure> {
        if self.stand_ins.contains_key(&target) {
            if let Some(Ok(AdminCall::Relay(request))) = AdminCall::decode(&data) {
                return match relay::execute(self, target, request) {
                    Outcome::Return(output) => Ok(output),
                    Outcome::Revert(data) => Err(CallFailure::Reverted(data)),
                    other => Err(CallFailure::Halted(format!("unexpected relay outcome {other:?}"))),
                };
            }
        }

        let result = self
            .execute(caller, TxKind::Call(target), data, value)
            .map_err(|e| CallFailure::Halted(e.to_string()))?;
        match result {
            ExecutionResult::Success { output, .. } => Ok(output.into_data()),
            ExecutionResult::Revert { output, .. } => Err(CallFailure::Reverted(output)),
            ExecutionResult::Halt { reason, .. } => Err(CallFailure::Halted(format!("{reason:?}"))),
        }
    }
}

impl CallHost for World {
    fn call(&mut self, caller: Address, target: Address, data: Bytes) -> Result<Bytes, CallFailure> {
        self.message_call(caller, target, data, U256::ZERO)
    }

    fn static_call(&mut self, caller: Address, target: Address, data: Bytes) -> Result<Bytes, CallFailure> {
        let snapshot = (self.static_depth == 0).then(|| self.stand_ins.clone());
        self.static_depth += 1;
        let result = self.message_call(caller, target, data, U256::ZERO);
        self.static_depth -= 1;
        if let Some(stand_ins) = snapshot {
            self.stand_ins = stand_ins;
        }
        result
    }
}

fn into_error(failure: CallFailure) -> DoppelError {
    match failure {
        CallFailure::Reverted(data) => DoppelError::reverted(data),
        CallFailure::Halted(reason) => DoppelError::Evm(reason),
    }
}

// ---------------------------------------------------------------------------
// EvmChain
// ---------------------------------------------------------------------------

/// EVM-backed [`Backend`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EvmChain {
    world: Arc<Mutex<World>>,
}

impl Default for EvmChain {
    fn default() -> Self {
        Self::new()
    }
}

impl EvmChain {
    pub fn new() -> Self {
        Self::with_config(EvmConfig::default())
    }

    pub fn with_config(config: EvmConfig) -> Self {
        Self {
            world: Arc::new(Mutex::new(World::new(config))),
        }
    }

    pub fn sender(&self) -> DoppelResult<Address> {
        Ok(self.lock()?.config.sender)
    }

    /// Places runtime `code` at a fresh address without running init code.
    pub fn deploy_code(&self, code: impl Into<Bytes>) -> DoppelResult<Address> {
        let mut world = self.lock()?;
        let address = world.next_address();
        world.set_code(address, code.into());
        Ok(address)
    }

    /// Runs `init_code` in a creation transaction from the sender.
    pub fn create(&self, init_code: impl Into<Bytes>) -> DoppelResult<Address> {
        let mut world = self.lock()?;
        let sender = world.config.sender;
        match world.execute(sender, TxKind::Create, init_code.into(), U256::ZERO)? {
            ExecutionResult::Success {
                output: Output::Create(_, Some(address)),
                ..
            } => {
                tracing::info!(%address, "created contract");
                Ok(address)
            }
            ExecutionResult::Revert { output, .. } => Err(DoppelError::reverted(output)),
            other => Err(DoppelError::Evm(format!("contract creation failed: {other:?}"))),
        }
    }

    /// Replaces the code at `address`. Drops any stand-in registered there.
    pub fn set_code(&self, address: Address, code: impl Into<Bytes>) -> DoppelResult<()> {
        let mut world = self.lock()?;
        world.stand_ins.remove(&address);
        world.set_code(address, code.into());
        Ok(())
    }

    pub fn set_balance(&self, address: Address, balance: U256) -> DoppelResult<()> {
        self.lock()?.set_balance(address, balance);
        Ok(())
    }

    pub fn balance(&self, address: Address) -> DoppelResult<U256> {
        Ok(self.lock()?.account(address).balance)
    }

    pub fn storage(&self, address: Address, slot: U256) -> DoppelResult<U256> {
        self.lock()?
            .db
            .storage_ref(address, slot)
            .map_err(|e| DoppelError::Evm(format!("{e:?}")))
    }

    /// Sends a transaction from the configured sender.
    pub fn transact(&self, to: Address, data: impl Into<Bytes>, value: U256) -> DoppelResult<Bytes> {
        let mut world = self.lock()?;
        let sender = world.config.sender;
        world.message_call(sender, to, data.into(), value).map_err(into_error)
    }

    /// A copy of the stand-in at `address`, for inspection.
    pub fn stand_in(&self, address: Address) -> DoppelResult<Option<StandIn>> {
        Ok(self.lock()?.stand_ins.get(&address).cloned())
    }

    fn lock(&self) -> DoppelResult<MutexGuard<'_, World>> {
        self.world
            .lock()
            .map_err(|_| DoppelError::Internal("evm state poisoned".into()))
    }
}

#[async_trait]
impl Backend for EvmChain {
    async fn call(&self, to: Address, data: Bytes) -> DoppelResult<Bytes> {
        self.transact(to, data, U256::ZERO)
    }

    async fn static_call(&self, to: Address, data: Bytes) -> DoppelResult<Bytes> {
        let mut world = self.lock()?;
        let sender = world.config.sender;
        CallHost::static_call(&mut *world, sender, to, data).map_err(into_error)
    }

    async fn send_value(&self, to: Address, value: U256) -> DoppelResult<()> {
        self.transact(to, Bytes::new(), value).map(drop)
    }

    async fn code_at(&self, address: Address) -> DoppelResult<Bytes> {
        Ok(self.lock()?.code_at(address))
    }

    async fn deploy_stand_in(&self) -> DoppelResult<Address> {
        let mut world = self.lock()?;
        let address = world.next_address();
        world.install_stand_in(address);
        Ok(address)
    }

    fn supports_code_injection(&self) -> bool {
        true
    }

    async fn install_stand_in(&self, address: Address) -> DoppelResult<()> {
        self.lock()?.install_stand_in(address);
        Ok(())
    }
}
