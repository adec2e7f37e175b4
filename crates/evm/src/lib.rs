//! `revm` host for doppel stand-ins.
//!
//! [`EvmChain`] runs real contract bytecode and answers calls to stand-in
//! addresses through [`StandInInspector`], so contracts under test can
//! depend on mocks exactly as they would on deployed contracts.

pub mod chain;
pub mod inspector;

pub use chain::{EvmChain, EvmConfig, TX_GAS_LIMIT_CAP};
pub use inspector::StandInInspector;
