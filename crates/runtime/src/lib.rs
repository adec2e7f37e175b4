//! Runtime side of the doppel stand-in: behavior store, dispatcher, relay.
//!
//! Synchronous and host-agnostic. A host (in-process or EVM) feeds call
//! data to [`StandIn::handle`] and acts on the returned [`Outcome`].

pub mod dispatcher;
pub mod relay;
pub mod stand_in;
pub mod store;

pub use dispatcher::{resolve, Matched, Outcome};
pub use relay::{CallFailure, CallHost};
pub use stand_in::{IncomingCall, StandIn, STAND_IN_CODE};
pub use store::{BehaviorStore, ResponseQueue};
