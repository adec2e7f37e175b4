//! Mock facade: a stand-in bound to a target ABI.

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::{Address, Bytes};
use doppel_core::wire::{decode_relay_output, RelayKind, RelayRequest};
use doppel_core::{AdminCall, DoppelResult};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::Backend;
use crate::codec::{self, Contract};
use crate::deploy::{deploy_stand_in, DeployOptions};
use crate::stub::{ReceiveStub, Stub};

/// A deployed stand-in that behaves like an instance of `abi`.
///
/// Programming goes through [`MockContract::stub`] and
/// [`MockContract::receive`]; [`MockContract::call`] and
/// [`MockContract::staticcall`] make the stand-in call other contracts as
/// itself.
pub struct MockContract<B> {
    backend: Arc<B>,
    contract: Contract,
    /// One builder per function, keyed by full signature.
    stubs: HashMap<String, Stub<B>>,
}

impl<B: Backend> MockContract<B> {
    /// Deploys (or installs) a stand-in and binds it to `abi`.
    pub async fn deploy(backend: Arc<B>, abi: JsonAbi, options: DeployOptions) -> DoppelResult<Self> {
        let address = deploy_stand_in(backend.as_ref(), &options).await?;
        Ok(Self::attach(backend, address, abi))
    }

    /// Binds an already deployed stand-in at `address` to `abi`.
    pub fn attach(backend: Arc<B>, address: Address, abi: JsonAbi) -> Self {
        Self {
            backend,
            contract: Contract::new(address, abi),
            stubs: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.contract.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.contract.abi
    }

    /// The mocked ABI bound to the stand-in address.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Stub builder for a function, by bare name or full signature.
    ///
    /// The same builder is returned on every lookup, so a round left
    /// pending is still there on the next call.
    pub fn stub(&mut self, name_or_signature: &str) -> DoppelResult<&mut Stub<B>> {
        let function = self.contract.function(name_or_signature)?.clone();
        let backend = &self.backend;
        let address = self.contract.address;
        Ok(self
            .stubs
            .entry(function.signature())
            .or_insert_with(|| Stub::new(Arc::clone(backend), address, function)))
    }

    /// The native-value receive pseudo-function.
    pub fn receive(&self) -> ReceiveStub<B> {
        ReceiveStub::new(Arc::clone(&self.backend), self.contract.address)
    }

    /// Calls `function(params)` on `target` with the stand-in as caller and
    /// returns the raw output. Downstream reverts surface unchanged.
    pub async fn call(&self, target: &Contract, function: &str, params: &[DynSolValue]) -> DoppelResult<Bytes> {
        let data = target.encode_call(function, params)?;
        self.relay(target.address, data, RelayKind::Call).await
    }

    /// Read-only variant of [`MockContract::call`]; decodes the output
    /// against the target function's declared outputs.
    pub async fn staticcall(
        &self,
        target: &Contract,
        function: &str,
        params: &[DynSolValue],
    ) -> DoppelResult<DynSolValue> {
        let f = target.function(function)?;
        let data = codec::encode_call(f, params)?;
        let output = self.relay(target.address, data, RelayKind::StaticCall).await?;
        codec::decode_outputs(f, &output)
    }

    /// Calls a mocked function on the stand-in the way code under test
    /// would, decoding the programmed response.
    pub async fn invoke(&self, function: &str, params: &[DynSolValue]) -> DoppelResult<DynSolValue> {
        let (f, data) = self.encode_own(function, params)?;
        let output = self.backend.call(self.contract.address, data).await?;
        codec::decode_outputs(f, &output)
    }

    /// Like [`MockContract::invoke`] but without persisting queue pops.
    pub async fn invoke_static(&self, function: &str, params: &[DynSolValue]) -> DoppelResult<DynSolValue> {
        let (f, data) = self.encode_own(function, params)?;
        let output = self.backend.static_call(self.contract.address, data).await?;
        codec::decode_outputs(f, &output)
    }

    fn encode_own(&self, function: &str, params: &[DynSolValue]) -> DoppelResult<(&Function, Bytes)> {
        let f = self.contract.function(function)?;
        Ok((f, codec::encode_call(f, params)?))
    }

    async fn relay(&self, target: Address, data: Bytes, kind: RelayKind) -> DoppelResult<Bytes> {
        let admin = AdminCall::Relay(RelayRequest { target, data, kind }).encode();
        let wrapped = match kind {
            RelayKind::Call => self.backend.call(self.contract.address, admin).await?,
            RelayKind::StaticCall => self.backend.static_call(self.contract.address, admin).await?,
        };
        decode_relay_output(&wrapped)
    }
}
