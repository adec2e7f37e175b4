//! Administrative wire format between the client and a stand-in.
//!
//! Every message is an ordinary ABI-encoded call on the stand-in's
//! address, so any host that can deliver call data can program a mock.

use alloy_primitives::{Address, Bytes, Selector};
use alloy_sol_types::{sol, SolCall, SolInterface, SolValue};
use serde::{Deserialize, Serialize};

use crate::error::{DoppelError, DoppelResult};
use crate::types::{selector_of, CallKey, ResponseEntry, SELECTOR_LEN};

sol! {
    /// Administrative entry points understood by every stand-in.
    interface IStandIn {
        function __doppel_setReturn(bytes key, bytes value) external;
        function __doppel_queueReturn(bytes key, bytes value) external;
        function __doppel_setRevert(bytes key, string reason) external;
        function __doppel_queueRevert(bytes key, string reason) external;
        function __doppel_setReceiveRevert(string reason) external;
        function __doppel_call(address target, bytes data) external returns (bytes);
        function __doppel_staticcall(address target, bytes data) external view returns (bytes);
    }
}

use IStandIn::IStandInCalls;

/// Whether the relayed call may mutate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayKind {
    Call,
    StaticCall,
}

/// A call the stand-in makes on the client's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub target: Address,
    pub data: Bytes,
    pub kind: RelayKind,
}

/// A decoded administrative message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    /// Replace the queue for `key` with a single entry.
    SetResponse { key: CallKey, entry: ResponseEntry },
    /// Append an entry to the queue for `key`.
    QueueResponse { key: CallKey, entry: ResponseEntry },
    /// Make native-value transfers to the stand-in revert.
    SetReceiveRevert { reason: String },
    Relay(RelayRequest),
}

impl AdminCall {
    pub fn encode(&self) -> Bytes {
        let data = match self {
            Self::SetResponse {
                key,
                entry: ResponseEntry::Return(value),
            } => IStandIn::__doppel_setReturnCall {
                key: key.to_bytes(),
                value: value.clone(),
            }
            .abi_encode(),
            Self::SetResponse {
                key,
                entry: ResponseEntry::Revert(reason),
            } => IStandIn::__doppel_setRevertCall {
                key: key.to_bytes(),
                reason: reason.clone(),
            }
            .abi_encode(),
            Self::QueueResponse {
                key,
                entry: ResponseEntry::Return(value),
            } => IStandIn::__doppel_queueReturnCall {
                key: key.to_bytes(),
                value: value.clone(),
            }
            .abi_encode(),
            Self::QueueResponse {
                key,
                entry: ResponseEntry::Revert(reason),
            } => IStandIn::__doppel_queueRevertCall {
                key: key.to_bytes(),
                reason: reason.clone(),
            }
            .abi_encode(),
            Self::SetReceiveRevert { reason } => IStandIn::__doppel_setReceiveRevertCall {
                reason: reason.clone(),
            }
            .abi_encode(),
            Self::Relay(RelayRequest {
                target,
                data,
                kind: RelayKind::Call,
            }) => IStandIn::__doppel_callCall {
                target: *target,
                data: data.clone(),
            }
            .abi_encode(),
            Self::Relay(RelayRequest {
                target,
                data,
                kind: RelayKind::StaticCall,
            }) => IStandIn::__doppel_staticcallCall {
                target: *target,
                data: data.clone(),
            }
            .abi_encode(),
        };
        data.into()
    }

    /// Decodes `data` as an administrative message.
    ///
    /// Returns `None` when the selector is not administrative, so the
    /// caller can route the call to the dispatcher instead.
    pub fn decode(data: &[u8]) -> Option<DoppelResult<Self>> {
        if !is_admin_selector(data) {
            return None;
        }
        let decoded = IStandInCalls::abi_decode(data)
            .map_err(|e| DoppelError::Abi(format!("malformed administrative call: {e}")));
        Some(decoded.map(Self::from))
    }
}

impl From<IStandInCalls> for AdminCall {
    fn from(call: IStandInCalls) -> Self {
        match call {
            IStandInCalls::__doppel_setReturn(c) => Self::SetResponse {
                key: CallKey::from_raw(&c.key),
                entry: ResponseEntry::Return(c.value),
            },
            IStandInCalls::__doppel_queueReturn(c) => Self::QueueResponse {
                key: CallKey::from_raw(&c.key),
                entry: ResponseEntry::Return(c.value),
            },
            IStandInCalls::__doppel_setRevert(c) => Self::SetResponse {
                key: CallKey::from_raw(&c.key),
                entry: ResponseEntry::Revert(c.reason),
            },
            IStandInCalls::__doppel_queueRevert(c) => Self::QueueResponse {
                key: CallKey::from_raw(&c.key),
                entry: ResponseEntry::Revert(c.reason),
            },
            IStandInCalls::__doppel_setReceiveRevert(c) => {
                Self::SetReceiveRevert { reason: c.reason }
            }
            IStandInCalls::__doppel_call(c) => Self::Relay(RelayRequest {
                target: c.target,
                data: c.data,
                kind: RelayKind::Call,
            }),
            IStandInCalls::__doppel_staticcall(c) => Self::Relay(RelayRequest {
                target: c.target,
                data: c.data,
                kind: RelayKind::StaticCall,
            }),
        }
    }
}

/// True when the selector of `data` belongs to the administrative surface.
pub fn is_admin_selector(data: &[u8]) -> bool {
    if data.len() < SELECTOR_LEN {
        return false;
    }
    let sel: Selector = selector_of(data);
    IStandInCalls::valid_selector(sel.0)
}

/// Wraps raw relay output the way `returns (bytes)` is encoded.
pub fn encode_relay_output(output: &Bytes) -> Bytes {
    output.abi_encode().into()
}

/// Unwraps the `bytes` returned by a relay entry point.
pub fn decode_relay_output(data: &[u8]) -> DoppelResult<Bytes> {
    Bytes::abi_decode(data).map_err(|e| DoppelError::Abi(format!("malformed relay output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    fn add_selector() -> CallKey {
        CallKey::from_raw(&hex!("1003e2d2"))
    }

    #[test]
    fn set_return_roundtrips_through_the_wire() {
        let call = AdminCall::SetResponse {
            key: add_selector(),
            entry: ResponseEntry::Return(Bytes::from_static(&[1, 2, 3])),
        };
        let decoded = AdminCall::decode(&call.encode()).unwrap().unwrap();
        assert_eq!(decoded, call);
    }

    #[test]
    fn empty_revert_reason_survives_encoding() {
        let call = AdminCall::QueueResponse {
            key: add_selector(),
            entry: ResponseEntry::revert(""),
        };
        let decoded = AdminCall::decode(&call.encode()).unwrap().unwrap();
        assert_eq!(decoded, call);
    }

    #[test]
    fn user_calls_are_not_administrative() {
        let data = hex!("1003e2d20000000000000000000000000000000000000000000000000000000000000005");
        assert!(AdminCall::decode(&data).is_none());
        assert!(!is_admin_selector(&[]));
    }

    #[test]
    fn truncated_admin_call_is_an_abi_error() {
        let data = AdminCall::SetReceiveRevert {
            reason: "no".into(),
        }
        .encode();
        let result = AdminCall::decode(&data[..SELECTOR_LEN + 3]).unwrap();
        assert!(matches!(result, Err(DoppelError::Abi(_))));
    }

    #[test]
    fn relay_output_is_wrapped_as_bytes() {
        let raw = Bytes::from_static(&[0xaa; 40]);
        let wrapped = encode_relay_output(&raw);
        assert_eq!(wrapped.len(), 32 + 32 + 64);
        assert_eq!(decode_relay_output(&wrapped).unwrap(), raw);
    }
}
