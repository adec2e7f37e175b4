//! The stand-in: one generic contract that answers any ABI.
//!
//! Routes each incoming call to the receive path, the administrative
//! surface, or the dispatcher. Relay requests are handed back to the
//! host as [`Outcome::Relay`] so the stand-in holds no borrow while the
//! downstream call runs.

use alloy_primitives::{Address, Bytes, U256};
use doppel_core::{encode_revert, AdminCall, CallKey, ResponseEntry};

use crate::dispatcher::{resolve_traced, Outcome};
use crate::store::BehaviorStore;

/// Placeholder runtime code installed at stand-in addresses: a single
/// `STOP`, so code-size checks pass and accepted value transfers succeed.
pub const STAND_IN_CODE: &[u8] = &[0x00];

/// One call delivered to a stand-in.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub caller: Address,
    pub data: Bytes,
    pub value: U256,
}

impl IncomingCall {
    pub fn new(caller: Address, data: Bytes) -> Self {
        Self {
            caller,
            data,
            value: U256::ZERO,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// State of one deployed stand-in instance.
#[derive(Debug, Clone)]
pub struct StandIn {
    address: Address,
    store: BehaviorStore,
    receive_revert: Option<String>,
}

impl StandIn {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            store: BehaviorStore::new(),
            receive_revert: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn store(&self) -> &BehaviorStore {
        &self.store
    }

    /// Reason every native-value transfer currently reverts with, if programmed.
    pub fn receive_revert(&self) -> Option<&str> {
        self.receive_revert.as_deref()
    }

    /// Handles one call. Never fails: malformed administrative calls and
    /// unprogrammed functions both surface as reverts.
    pub fn handle(&mut self, call: &IncomingCall) -> Outcome {
        if call.data.is_empty() {
            return self.receive(call);
        }

        match AdminCall::decode(&call.data) {
            Some(Ok(admin)) => self.apply(admin),
            Some(Err(e)) => {
                tracing::debug!(stand_in = %self.address, error = %e, "rejected administrative call");
                Outcome::Revert(encode_revert(&e.to_string()))
            }
            None => self.dispatch(&call.data),
        }
    }

    /// Applies an administrative message.
    pub fn apply(&mut self, admin: AdminCall) -> Outcome {
        match admin {
            AdminCall::SetResponse { key, entry } => {
                self.log_write("set", &key, &entry);
                self.store.set(key, entry);
            }
            AdminCall::QueueResponse { key, entry } => {
                self.log_write("queue", &key, &entry);
                self.store.append(key, entry);
            }
            AdminCall::SetReceiveRevert { reason } => {
                tracing::debug!(stand_in = %self.address, reason = %reason, "receive will revert");
                self.receive_revert = Some(reason);
            }
            AdminCall::Relay(request) => return Outcome::Relay(request),
        }
        Outcome::Return(Bytes::new())
    }

    fn dispatch(&mut self, data: &Bytes) -> Outcome {
        let (entry, matched) = resolve_traced(&mut self.store, data);
        tracing::debug!(
            stand_in = %self.address,
            selector = %doppel_core::selector_of(data),
            ?matched,
            reverts = entry.is_revert(),
            "dispatched"
        );
        Outcome::from(entry)
    }

    fn receive(&self, call: &IncomingCall) -> Outcome {
        match &self.receive_revert {
            Some(reason) => {
                tracing::debug!(stand_in = %self.address, value = %call.value, "receive rejected");
                Outcome::Revert(encode_revert(reason))
            }
            None => Outcome::Accept,
        }
    }

    fn log_write(&self, op: &str, key: &CallKey, entry: &ResponseEntry) {
        tracing::debug!(
            stand_in = %self.address,
            op,
            exact = key.is_exact(),
            key = %key.to_bytes(),
            reverts = entry.is_revert(),
            "queue write"
        );
    }
}
