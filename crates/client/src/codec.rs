//! Thin layer over the alloy ABI codec.
//!
//! The engine itself treats call data as opaque bytes; only this module
//! knows how values map onto a function's declared types.

use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::{Address, Bytes};
use doppel_core::{DoppelError, DoppelResult};

/// A deployed contract the client can address: location plus ABI.
#[derive(Debug, Clone)]
pub struct Contract {
    pub address: Address,
    pub abi: JsonAbi,
}

impl Contract {
    pub fn new(address: Address, abi: JsonAbi) -> Self {
        Self { address, abi }
    }

    pub fn function(&self, name_or_signature: &str) -> DoppelResult<&Function> {
        find_function(&self.abi, name_or_signature)
    }

    /// Encodes a call to `name_or_signature` with `params`.
    pub fn encode_call(&self, name_or_signature: &str, params: &[DynSolValue]) -> DoppelResult<Bytes> {
        encode_call(self.function(name_or_signature)?, params)
    }
}

/// Parses an ABI from a JSON array, a build artifact object with an
/// `abi` field, or newline-separated human-readable signatures.
pub fn parse_abi(source: &str) -> DoppelResult<JsonAbi> {
    let trimmed = source.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| DoppelError::Abi(format!("invalid JSON ABI: {e}")));
    }
    if trimmed.starts_with('{') {
        let mut artifact: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|e| DoppelError::Abi(format!("invalid artifact: {e}")))?;
        let abi = artifact
            .get_mut("abi")
            .map(serde_json::Value::take)
            .ok_or_else(|| DoppelError::Abi("artifact has no `abi` field".into()))?;
        return serde_json::from_value(abi).map_err(|e| DoppelError::Abi(format!("invalid artifact ABI: {e}")));
    }
    JsonAbi::parse(
        source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//")),
    )
    .map_err(|e| DoppelError::Abi(format!("invalid human-readable ABI: {e}")))
}

/// Looks a function up by full signature (`add(uint256)`) or by bare
/// name when that name is not overloaded.
pub fn find_function<'a>(abi: &'a JsonAbi, name_or_signature: &str) -> DoppelResult<&'a Function> {
    let wanted: String = name_or_signature.chars().filter(|c| !c.is_whitespace()).collect();

    if wanted.contains('(') {
        return abi
            .functions()
            .find(|f| f.signature() == wanted)
            .ok_or(DoppelError::UnknownFunction(wanted));
    }

    match abi.function(&wanted).map(Vec::as_slice) {
        Some([only]) => Ok(only),
        Some([]) | None => Err(DoppelError::UnknownFunction(wanted)),
        Some(_) => Err(DoppelError::AmbiguousFunction(wanted)),
    }
}

/// Selector-prefixed call data for `function(params)`.
pub fn encode_call(function: &Function, params: &[DynSolValue]) -> DoppelResult<Bytes> {
    function
        .abi_encode_input(params)
        .map(Bytes::from)
        .map_err(|e| DoppelError::Abi(format!("cannot encode arguments for {}: {e}", function.signature())))
}

/// Return data for `function` carrying `values`.
pub fn encode_outputs(function: &Function, values: &[DynSolValue]) -> DoppelResult<Bytes> {
    function
        .abi_encode_output(values)
        .map(Bytes::from)
        .map_err(|e| DoppelError::Abi(format!("cannot encode return values for {}: {e}", function.signature())))
}

/// Decodes return data. A single declared output is unwrapped to a bare
/// value; zero or several outputs come back as a tuple.
pub fn decode_outputs(function: &Function, data: &[u8]) -> DoppelResult<DynSolValue> {
    let mut values = function
        .abi_decode_output(data)
        .map_err(|e| DoppelError::Abi(format!("cannot decode output of {}: {e}", function.signature())))?;
    if values.len() == 1 {
        if let Some(value) = values.pop() {
            return Ok(value);
        }
    }
    Ok(DynSolValue::Tuple(values))
}
