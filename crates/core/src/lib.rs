//! Domain models, the administrative wire ABI, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod error;
pub mod types;
pub mod wire;

pub use error::{DoppelError, DoppelResult};
pub use types::{
    decode_revert_reason, encode_revert, selector_of, CallKey, ResponseEntry,
    DEFAULT_RECEIVE_REVERT_REASON, DEFAULT_REVERT_REASON, NOT_INITIALIZED, SELECTOR_LEN,
};
pub use wire::{AdminCall, RelayKind, RelayRequest};
