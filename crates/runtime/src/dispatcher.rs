//! Dispatcher: resolves incoming call data against the behavior store.
//!
//! Resolution order:
//!   1. the exact key built from the full call data,
//!   2. the selector key (first four bytes),
//!   3. otherwise a revert with [`NOT_INITIALIZED`].
//!
//! Whichever queue wins is consumed with the sticky-tail rule.

use alloy_primitives::Bytes;
use doppel_core::wire::{encode_relay_output, RelayRequest};
use doppel_core::{encode_revert, selector_of, ResponseEntry, NOT_INITIALIZED};

use crate::store::BehaviorStore;

/// What the stand-in answers to one incoming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Successful return with raw output bytes.
    Return(Bytes),
    /// Revert with a raw payload (usually `Error(string)`).
    Revert(Bytes),
    /// Native-value transfer accepted; the host completes the transfer.
    Accept,
    /// The host must perform this call with the stand-in as caller and
    /// report the result through [`crate::relay::execute`].
    Relay(RelayRequest),
}

impl Outcome {
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Revert(_))
    }

    /// Wraps relay output so it matches the `returns (bytes)` encoding.
    pub fn relayed(output: &Bytes) -> Self {
        Self::Return(encode_relay_output(output))
    }
}

impl From<ResponseEntry> for Outcome {
    fn from(entry: ResponseEntry) -> Self {
        match entry {
            ResponseEntry::Return(data) => Self::Return(data),
            ResponseEntry::Revert(reason) => Self::Revert(encode_revert(&reason)),
        }
    }
}

/// Which key granularity produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matched {
    Exact,
    Selector,
    Unmatched,
}

/// Resolves `call_data`, consuming from the matching queue.
pub fn resolve(store: &mut BehaviorStore, call_data: &Bytes) -> ResponseEntry {
    resolve_traced(store, call_data).0
}

/// Like [`resolve`], also reporting which granularity matched.
pub fn resolve_traced(store: &mut BehaviorStore, call_data: &Bytes) -> (ResponseEntry, Matched) {
    if let Some(entry) = store
        .exact_mut(call_data)
        .filter(|q| !q.is_empty())
        .and_then(|q| q.consume())
    {
        return (entry, Matched::Exact);
    }

    let selector = selector_of(call_data);
    if let Some(entry) = store
        .selector_mut(&selector)
        .filter(|q| !q.is_empty())
        .and_then(|q| q.consume())
    {
        return (entry, Matched::Selector);
    }

    (ResponseEntry::revert(NOT_INITIALIZED), Matched::Unmatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;
    use doppel_core::{decode_revert_reason, CallKey, DEFAULT_REVERT_REASON};

    const ADD: [u8; 4] = hex!("1003e2d2");

    fn add_call(arg: u8) -> Bytes {
        let mut data = ADD.to_vec();
        let mut word = [0u8; 32];
        word[31] = arg;
        data.extend_from_slice(&word);
        data.into()
    }

    fn ret(v: u8) -> ResponseEntry {
        ResponseEntry::Return(Bytes::from(vec![v]))
    }

    fn selector_key() -> CallKey {
        CallKey::from_raw(&ADD)
    }

    #[test]
    fn unprogrammed_call_is_not_initialized() {
        let mut store = BehaviorStore::new();
        let (entry, matched) = resolve_traced(&mut store, &add_call(1));
        assert_eq!(entry, ResponseEntry::revert(NOT_INITIALIZED));
        assert_eq!(matched, Matched::Unmatched);
    }

    #[test]
    fn selector_key_matches_any_arguments() {
        let mut store = BehaviorStore::new();
        store.set(selector_key(), ret(7));
        assert_eq!(resolve(&mut store, &add_call(1)), ret(7));
        assert_eq!(resolve(&mut store, &add_call(200)), ret(7));
    }

    #[test]
    fn exact_key_takes_precedence() {
        let mut store = BehaviorStore::new();
        store.set(CallKey::Exact(add_call(5)), ret(1));
        store.set(selector_key(), ret(2));

        let (entry, matched) = resolve_traced(&mut store, &add_call(5));
        assert_eq!((entry, matched), (ret(1), Matched::Exact));
        let (entry, matched) = resolve_traced(&mut store, &add_call(6));
        assert_eq!((entry, matched), (ret(2), Matched::Selector));
    }

    #[test]
    fn exact_key_does_not_leak_to_other_arguments() {
        let mut store = BehaviorStore::new();
        store.set(CallKey::Exact(add_call(5)), ret(1));
        assert_eq!(
            resolve(&mut store, &add_call(2)),
            ResponseEntry::revert(NOT_INITIALIZED)
        );
    }

    #[test]
    fn no_argument_function_resolves_through_selector_map() {
        let mut store = BehaviorStore::new();
        store.set(selector_key(), ret(3));
        assert_eq!(resolve(&mut store, &Bytes::from(ADD.to_vec())), ret(3));
    }

    #[test]
    fn queue_is_consumed_with_sticky_tail() {
        let mut store = BehaviorStore::new();
        store.set(selector_key(), ret(1));
        store.append(selector_key(), ret(2));
        store.append(selector_key(), ResponseEntry::revert(DEFAULT_REVERT_REASON));

        assert_eq!(resolve(&mut store, &add_call(0)), ret(1));
        assert_eq!(resolve(&mut store, &add_call(0)), ret(2));
        for _ in 0..3 {
            assert_eq!(
                resolve(&mut store, &add_call(0)),
                ResponseEntry::revert(DEFAULT_REVERT_REASON)
            );
        }
    }

    #[test]
    fn revert_entry_becomes_error_string_payload() {
        let outcome = Outcome::from(ResponseEntry::revert(""));
        match outcome {
            Outcome::Revert(data) => assert_eq!(decode_revert_reason(&data).as_deref(), Some("")),
            other => panic!("expected revert, got {other:?}"),
        }
    }
}
