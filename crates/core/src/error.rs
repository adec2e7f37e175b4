//! Centralized error types for the doppel workspace.

use alloy_primitives::{Address, Bytes};
use thiserror::Error;

use crate::types::decode_revert_reason;

/// Top-level error enum. Variants map to subsystems.
///
/// The stub-programming variants render the exact messages test suites
/// assert on, so their `Display` text must not change.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DoppelError {
    #[error("Revert must be the last call")]
    RevertNotLast,

    #[error("withArgs can be called only once")]
    WithArgsTwice,

    #[error("Cannot mock return values from a void function")]
    VoidReturn,

    #[error("Receive function return is not implemented.")]
    ReceiveReturn,

    /// A call ended in a revert. `reason` is set when the payload is a
    /// standard `Error(string)`.
    #[error("execution reverted: {}", .reason.as_deref().unwrap_or("<no reason>"))]
    Reverted { reason: Option<String>, data: Bytes },

    #[error("Unknown function {0}")]
    UnknownFunction(String),

    #[error("Function name {0} is overloaded; use the full signature")]
    AmbiguousFunction(String),

    #[error("{0} already contains a contract. If you want to override it, set the override parameter.")]
    AddressOccupied(Address),

    #[error("Can only deploy mock contract at a fixed address on a backend that supports code injection")]
    InstallUnsupported,

    #[error("Couldn't deploy at {0}")]
    InstallFailed(Address),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("EVM error: {0}")]
    Evm(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DoppelError {
    /// Wraps a raw revert payload, decoding the reason when possible.
    pub fn reverted(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::Reverted {
            reason: decode_revert_reason(&data),
            data,
        }
    }

    /// The decoded revert reason, if this is a revert with an `Error(string)` payload.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Reverted { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted { .. })
    }
}

pub type DoppelResult<T> = Result<T, DoppelError>;
