//! Host abstraction the client programs stand-ins through.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use doppel_core::{DoppelError, DoppelResult};

/// Anything that can deliver call data to an address and install stand-ins.
///
/// Reverts must surface as [`DoppelError::Reverted`] carrying the raw
/// payload, so callers can assert on reasons.
#[async_trait]
pub trait Backend: Send + Sync {
    /// State-mutating call from the backend's default sender.
    async fn call(&self, to: Address, data: Bytes) -> DoppelResult<Bytes>;

    /// Read-only call: state changes made while executing are discarded.
    async fn static_call(&self, to: Address, data: Bytes) -> DoppelResult<Bytes>;

    /// Plain native-value transfer with empty call data.
    async fn send_value(&self, to: Address, value: U256) -> DoppelResult<()>;

    /// Runtime code at `address`; empty when nothing is deployed there.
    async fn code_at(&self, address: Address) -> DoppelResult<Bytes>;

    /// Deploys a fresh stand-in and returns its address.
    async fn deploy_stand_in(&self) -> DoppelResult<Address>;

    /// Whether [`Backend::install_stand_in`] is available.
    fn supports_code_injection(&self) -> bool {
        false
    }

    /// Installs stand-in code at a caller-chosen address, replacing
    /// whatever lives there.
    async fn install_stand_in(&self, address: Address) -> DoppelResult<()> {
        let _ = address;
        Err(DoppelError::InstallUnsupported)
    }
}
