//! In-process backend: stand-ins and native Rust contracts in one map.
//!
//! `LocalChain` executes synchronously under a mutex. Contracts call each
//! other through [`CallHost`], so relays and reentrant calls behave the
//! way they would on a chain, minus gas and bytecode.

use alloy_primitives::{address, Address, Bytes, U256};
use async_trait::async_trait;
use doppel_core::{DoppelError, DoppelResult};
use doppel_runtime::relay::{self, CallFailure, CallHost};
use doppel_runtime::{IncomingCall, Outcome, StandIn, STAND_IN_CODE};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::Backend;

/// Sender of every top-level call made through the [`Backend`] impl.
pub const DEFAULT_SENDER: Address = address!("00000000000000000000000000000000d0bbe100");

/// Code reported for native contracts (a lone `INVALID`).
const NATIVE_CODE: &[u8] = &[0xfe];

/// Context handed to a native contract for one call.
#[derive(Debug, Clone)]
pub struct NativeCall {
    pub address: Address,
    pub caller: Address,
    pub data: Bytes,
    pub value: U256,
    /// Set inside read-only calls; the contract must not mutate state.
    pub is_static: bool,
}

/// A contract implemented in Rust. `Err` carries revert data.
pub trait NativeContract: Send {
    fn call(&mut self, host: &mut dyn CallHost, call: &NativeCall) -> Result<Bytes, Bytes>;
}

enum Account {
    StandIn(StandIn),
    Native(Box<dyn NativeContract>),
    /// A native contract currently executing further up the stack.
    Busy,
}

#[derive(Default)]
struct ChainState {
    accounts: HashMap<Address, Account>,
    balances: HashMap<Address, U256>,
    nonce: u64,
    static_depth: usize,
}

/// Stand-in state and balances captured on entry to a read-only call.
struct Snapshot {
    stand_ins: Vec<(Address, StandIn)>,
    balances: HashMap<Address, U256>,
}

impl ChainState {
    fn next_address(&mut self) -> Address {
        let address = DEFAULT_SENDER.create(self.nonce);
        self.nonce += 1;
        address
    }

    fn code_at(&self, address: Address) -> Bytes {
        match self.accounts.get(&address) {
            None => Bytes::new(),
            Some(Account::StandIn(_)) => Bytes::from_static(STAND_IN_CODE),
            Some(Account::Native(_) | Account::Busy) => Bytes::from_static(NATIVE_CODE),
        }
    }

    fn credit(&mut self, address: Address, value: U256) {
        if !value.is_zero() {
            let balance = self.balances.entry(address).or_default();
            *balance = balance.saturating_add(value);
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            stand_ins: self
                .accounts
                .iter()
                .filter_map(|(addr, account)| match account {
                    Account::StandIn(s) => Some((*addr, s.clone())),
                    _ => None,
                })
                .collect(),
            balances: self.balances.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        for (address, stand_in) in snapshot.stand_ins {
            self.accounts.insert(address, Account::StandIn(stand_in));
        }
        self.balances = snapshot.balances;
    }

    fn dispatch(&mut self, caller: Address, target: Address, data: Bytes, value: U256) -> Result<Bytes, CallFailure> {
        let outcome = match self.accounts.get_mut(&target) {
            None => Outcome::Accept,
            Some(Account::Busy) => {
                return Err(CallFailure::Halted(format!("reentrant call into {target}")));
            }
            Some(Account::Native(_)) => return self.call_native(caller, target, data, value),
            Some(Account::StandIn(stand_in)) => stand_in.handle(&IncomingCall::new(caller, data).with_value(value)),
        };

        let outcome = match outcome {
            Outcome::Relay(request) => relay::execute(self, target, request),
            other => other,
        };

        match outcome {
            Outcome::Return(output) => {
                self.credit(target, value);
                Ok(output)
            }
            Outcome::Accept => {
                self.credit(target, value);
                Ok(Bytes::new())
            }
            Outcome::Revert(data) => Err(CallFailure::Reverted(data)),
            Outcome::Relay(_) => Err(CallFailure::Halted("relay did not complete".into())),
        }
    }

    fn call_native(&mut self, caller: Address, target: Address, data: Bytes, value: U256) -> Result<Bytes, CallFailure> {
        let Some(Account::Native(mut native)) = self.accounts.insert(target, Account::Busy) else {
            return Err(CallFailure::Halted(format!("{target} is not a native contract")));
        };

        let call = NativeCall {
            address: target,
            caller,
            data,
            value,
            is_static: self.static_depth > 0,
        };
        // Natives keep their own state; stand-ins and balances revert with the call.
        let snapshot = self.snapshot();
        let result = native.call(self, &call);
        self.accounts.insert(target, Account::Native(native));

        match result {
            Ok(output) => {
                self.credit(target, value);
                Ok(output)
            }
            Err(revert) => {
                self.restore(snapshot);
                Err(CallFailure::Reverted(revert))
            }
        }
    }
}

impl CallHost for ChainState {
    fn call(&mut self, caller: Address, target: Address, data: Bytes) -> Result<Bytes, CallFailure> {
        self.dispatch(caller, target, data, U256::ZERO)
    }

    fn static_call(&mut self, caller: Address, target: Address, data: Bytes) -> Result<Bytes, CallFailure> {
        let snapshot = (self.static_depth == 0).then(|| self.snapshot());
        self.static_depth += 1;
        let result = self.dispatch(caller, target, data, U256::ZERO);
        self.static_depth -= 1;
        if let Some(snapshot) = snapshot {
            self.restore(snapshot);
        }
        result
    }
}

/// In-memory chain hosting stand-ins and [`NativeContract`]s.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LocalChain {
    state: Arc<Mutex<ChainState>>,
    code_injection: bool,
}

impl Default for LocalChain {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChain {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState::default())),
            code_injection: true,
        }
    }

    /// A chain without the install-at-address capability, like a live
    /// network.
    pub fn without_code_injection(mut self) -> Self {
        self.code_injection = false;
        self
    }

    pub fn sender(&self) -> Address {
        DEFAULT_SENDER
    }

    /// Deploys `contract` at a fresh address.
    pub fn deploy_native(&self, contract: impl NativeContract + 'static) -> DoppelResult<Address> {
        let mut state = self.lock()?;
        let address = state.next_address();
        state.accounts.insert(address, Account::Native(Box::new(contract)));
        Ok(address)
    }

    /// Places `contract` at `address`, replacing anything there.
    pub fn install_native(&self, address: Address, contract: impl NativeContract + 'static) -> DoppelResult<()> {
        self.lock()?
            .accounts
            .insert(address, Account::Native(Box::new(contract)));
        Ok(())
    }

    /// A copy of the stand-in at `address`, for inspection.
    pub fn stand_in(&self, address: Address) -> DoppelResult<Option<StandIn>> {
        Ok(match self.lock()?.accounts.get(&address) {
            Some(Account::StandIn(s)) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn balance(&self, address: Address) -> DoppelResult<U256> {
        Ok(self.lock()?.balances.get(&address).copied().unwrap_or_default())
    }

    fn lock(&self) -> DoppelResult<MutexGuard<'_, ChainState>> {
        self.state
            .lock()
            .map_err(|_| DoppelError::Internal("local chain state poisoned".into()))
    }
}

fn into_error(failure: CallFailure) -> DoppelError {
    match failure {
        CallFailure::Reverted(data) => DoppelError::reverted(data),
        CallFailure::Halted(reason) => DoppelError::Backend(reason),
    }
}

#[async_trait]
impl Backend for LocalChain {
    async fn call(&self, to: Address, data: Bytes) -> DoppelResult<Bytes> {
        let mut state = self.lock()?;
        state.dispatch(DEFAULT_SENDER, to, data, U256::ZERO).map_err(into_error)
    }

    async fn static_call(&self, to: Address, data: Bytes) -> DoppelResult<Bytes> {
        let mut state = self.lock()?;
        CallHost::static_call(&mut *state, DEFAULT_SENDER, to, data).map_err(into_error)
    }

    async fn send_value(&self, to: Address, value: U256) -> DoppelResult<()> {
        let mut state = self.lock()?;
        state
            .dispatch(DEFAULT_SENDER, to, Bytes::new(), value)
            .map(drop)
            .map_err(into_error)
    }

    async fn code_at(&self, address: Address) -> DoppelResult<Bytes> {
        Ok(self.lock()?.code_at(address))
    }

    async fn deploy_stand_in(&self) -> DoppelResult<Address> {
        let mut state = self.lock()?;
        let address = state.next_address();
        state.accounts.insert(address, Account::StandIn(StandIn::new(address)));
        Ok(address)
    }

    fn supports_code_injection(&self) -> bool {
        self.code_injection
    }

    async fn install_stand_in(&self, address: Address) -> DoppelResult<()> {
        if !self.code_injection {
            return Err(DoppelError::InstallUnsupported);
        }
        self.lock()?
            .accounts
            .insert(address, Account::StandIn(StandIn::new(address)));
        Ok(())
    }
}
