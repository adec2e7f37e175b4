//! Domain types for the doppel mock contract engine.

use alloy_primitives::{Bytes, Selector};
use alloy_sol_types::{Revert, SolError};
use serde::{Deserialize, Serialize};

/// Length of a function selector prefix.
pub const SELECTOR_LEN: usize = 4;

/// Revert message for calls that match no programmed behavior.
pub const NOT_INITIALIZED: &str = "Mock on the method is not initialized";

/// Revert message used by `reverts()` when no reason is given.
pub const DEFAULT_REVERT_REASON: &str = "Mock revert";

/// Reason used when the receive path is made to revert without one.
pub const DEFAULT_RECEIVE_REVERT_REASON: &str = "Mock Revert";

// ---------------------------------------------------------------------------
// Call keys
// ---------------------------------------------------------------------------

/// Raw call data used as a lookup key.
///
/// A `Selector` key matches any arguments; an `Exact` key matches only the
/// full encoded call it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallKey {
    Selector(Selector),
    Exact(Bytes),
}

impl CallKey {
    /// Classifies raw key bytes: exactly [`SELECTOR_LEN`] bytes is a
    /// selector key, anything else is exact.
    pub fn from_raw(raw: &[u8]) -> Self {
        match <[u8; SELECTOR_LEN]>::try_from(raw) {
            Ok(sel) => Self::Selector(Selector::from(sel)),
            Err(_) => Self::Exact(Bytes::copy_from_slice(raw)),
        }
    }

    /// Raw key bytes as sent over the administrative wire.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Selector(sel) => Bytes::copy_from_slice(sel.as_slice()),
            Self::Exact(data) => data.clone(),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

/// Selector prefix of `call_data`, zero-padded when the data is shorter
/// than a selector.
pub fn selector_of(call_data: &[u8]) -> Selector {
    let mut sel = [0u8; SELECTOR_LEN];
    let n = call_data.len().min(SELECTOR_LEN);
    sel[..n].copy_from_slice(&call_data[..n]);
    Selector::from(sel)
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// One programmed response.
///
/// `Revert("")` is a real entry: it reverts with an empty reason and is
/// never confused with "nothing programmed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseEntry {
    Return(Bytes),
    Revert(String),
}

impl ResponseEntry {
    pub fn revert(reason: impl Into<String>) -> Self {
        Self::Revert(reason.into())
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Revert(_))
    }
}

// ---------------------------------------------------------------------------
// Revert payloads
// ---------------------------------------------------------------------------

/// Encodes `reason` as a standard `Error(string)` revert payload.
pub fn encode_revert(reason: &str) -> Bytes {
    Revert {
        reason: reason.to_string(),
    }
    .abi_encode()
    .into()
}

/// Decodes an `Error(string)` revert payload. Returns `None` for empty
/// data or any other payload shape.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < SELECTOR_LEN || data[..SELECTOR_LEN] != Revert::SELECTOR {
        return None;
    }
    Revert::abi_decode(data).ok().map(|r| r.reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    #[test]
    fn four_bytes_is_a_selector_key() {
        let key = CallKey::from_raw(&hex!("1003e2d2"));
        assert_eq!(key, CallKey::Selector(Selector::from(hex!("1003e2d2"))));
        assert!(!key.is_exact());
    }

    #[test]
    fn longer_data_is_an_exact_key() {
        let raw = hex!("1003e2d20000000000000000000000000000000000000000000000000000000000000005");
        let key = CallKey::from_raw(&raw);
        assert!(key.is_exact());
        assert_eq!(key.to_bytes().as_ref(), &raw[..]);
    }

    #[test]
    fn short_data_pads_selector() {
        assert_eq!(selector_of(&[0xab]), Selector::from([0xab, 0, 0, 0]));
        assert_eq!(selector_of(&[]), Selector::ZERO);
    }

    #[test]
    fn error_string_payload_decodes() {
        let data = encode_revert("Mock revert");
        assert_eq!(&data[..4], &hex!("08c379a0"));
        assert_eq!(decode_revert_reason(&data).as_deref(), Some("Mock revert"));
    }

    #[test]
    fn empty_reason_is_still_a_reason() {
        let data = encode_revert("");
        assert!(!data.is_empty());
        assert_eq!(decode_revert_reason(&data).as_deref(), Some(""));
    }

    #[test]
    fn raw_payload_has_no_reason() {
        assert_eq!(decode_revert_reason(&[]), None);
        assert_eq!(decode_revert_reason(&hex!("deadbeef")), None);
    }
}
