//! Relay: lets a stand-in call third-party contracts as itself.
//!
//! The stand-in never executes the downstream call; it asks its host via
//! [`CallHost`]. Downstream failures come back byte-for-byte.

use alloy_primitives::{Address, Bytes};
use doppel_core::wire::{RelayKind, RelayRequest};

use crate::dispatcher::Outcome;

/// Why a host-level call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The callee reverted with this payload.
    Reverted(Bytes),
    /// Execution stopped without revert data (out of gas, invalid opcode, ...).
    Halted(String),
}

impl CallFailure {
    /// Revert payload as seen by the relay invoker. Halts carry no data.
    pub fn into_revert_data(self) -> Bytes {
        match self {
            Self::Reverted(data) => data,
            Self::Halted(_) => Bytes::new(),
        }
    }
}

/// The host's call primitive.
pub trait CallHost {
    /// State-mutating call from `caller` to `target`.
    fn call(&mut self, caller: Address, target: Address, data: Bytes) -> Result<Bytes, CallFailure>;

    /// Read-only call from `caller` to `target`.
    fn static_call(
        &mut self,
        caller: Address,
        target: Address,
        data: Bytes,
    ) -> Result<Bytes, CallFailure>;
}

/// Executes `request` through `host` with `stand_in` as caller.
///
/// Success wraps the raw output as `bytes`; failure re-raises the
/// downstream revert payload unchanged.
pub fn execute<H: CallHost + ?Sized>(host: &mut H, stand_in: Address, request: RelayRequest) -> Outcome {
    let RelayRequest { target, data, kind } = request;
    let result = match kind {
        RelayKind::Call => host.call(stand_in, target, data),
        RelayKind::StaticCall => host.static_call(stand_in, target, data),
    };

    match result {
        Ok(output) => {
            tracing::debug!(%stand_in, %target, ?kind, out_len = output.len(), "relay ok");
            Outcome::relayed(&output)
        }
        Err(CallFailure::Reverted(data)) => {
            tracing::debug!(%stand_in, %target, ?kind, "relay reverted downstream");
            Outcome::Revert(data)
        }
        Err(failure @ CallFailure::Halted(_)) => {
            tracing::warn!(%stand_in, %target, ?kind, ?failure, "relay halted downstream");
            Outcome::Revert(failure.into_revert_data())
        }
    }
}
