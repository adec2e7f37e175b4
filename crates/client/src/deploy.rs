//! Stand-in deployment: fresh address or code injection at a fixed one.

use alloy_primitives::Address;
use doppel_core::{DoppelError, DoppelResult};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;

/// Where and how to place a stand-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOptions {
    /// Fixed address to install at. `None` deploys at a fresh address.
    #[serde(default)]
    pub address: Option<Address>,
    /// Replace an existing contract at `address`.
    #[serde(default, rename = "override")]
    pub override_code: bool,
}

impl DeployOptions {
    pub fn at(address: Address) -> Self {
        Self {
            address: Some(address),
            override_code: false,
        }
    }

    pub fn with_override(mut self, override_code: bool) -> Self {
        self.override_code = override_code;
        self
    }
}

/// Places a stand-in according to `options` and returns its address.
///
/// For a fixed address the checks run in order: the backend must support
/// code injection, the address must be empty unless overriding, and the
/// install must leave code behind.
pub async fn deploy_stand_in<B: Backend + ?Sized>(backend: &B, options: &DeployOptions) -> DoppelResult<Address> {
    let Some(address) = options.address else {
        let address = backend.deploy_stand_in().await?;
        tracing::info!(%address, "deployed stand-in");
        return Ok(address);
    };

    if !backend.supports_code_injection() {
        return Err(DoppelError::InstallUnsupported);
    }

    if !options.override_code && !backend.code_at(address).await?.is_empty() {
        return Err(DoppelError::AddressOccupied(address));
    }

    backend.install_stand_in(address).await?;
    if backend.code_at(address).await?.is_empty() {
        return Err(DoppelError::InstallFailed(address));
    }

    tracing::info!(%address, overridden = options.override_code, "installed stand-in");
    Ok(address)
}
