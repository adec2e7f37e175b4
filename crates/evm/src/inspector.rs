//! Inspector that answers calls to stand-in addresses.
//!
//! Stand-ins live outside the EVM. When a frame targets the code of a
//! registered stand-in, the `call` hook hands the input to
//! [`StandIn::handle`] and short-circuits the frame with its answer.
//!
//! Stand-in state is not part of the revm journal, so every frame that
//! runs bytecode checkpoints it and `call_end` / `create_end` restore the
//! checkpoint when the frame fails.

use alloy_primitives::{Address, Bytes, U256};
use doppel_core::wire::{encode_relay_output, RelayKind, RelayRequest};
use doppel_runtime::{IncomingCall, Outcome, StandIn};
use revm::context_interface::{ContextTr, JournalTr};
use revm::inspector::Inspector;
use revm::interpreter::interpreter::EthInterpreter;
use revm::interpreter::{
    CallInput, CallInputs, CallOutcome, CallValue, CreateInputs, CreateOutcome, Gas, InstructionResult,
    InterpreterResult,
};
use std::collections::HashMap;

/// Bookkeeping for one open frame.
struct Checkpoint {
    /// Stand-in state on frame entry; `None` for frames answered directly.
    stand_ins: Option<HashMap<Address, StandIn>>,
    /// The frame was redirected from a stand-in relay; its output is
    /// wrapped as `bytes` on success.
    relay: bool,
}

/// How the `call` hook disposes of a frame aimed at a stand-in.
enum Route {
    /// Short-circuit with this result.
    Answer(InstructionResult, Bytes),
    /// Run the (possibly rewritten) frame normally.
    Run { relay: bool },
}

/// Routes calls for registered stand-ins during one transaction.
pub struct StandInInspector<'a> {
    stand_ins: &'a mut HashMap<Address, StandIn>,
    checkpoints: Vec<Checkpoint>,
    /// Forces the next frame to be static. Set for the entry frame of a
    /// read-only call.
    static_entry: bool,
    /// Calls answered by a stand-in in this transaction.
    pub intercepted: usize,
}

impl<'a> StandInInspector<'a> {
    pub fn new(stand_ins: &'a mut HashMap<Address, StandIn>) -> Self {
        Self {
            stand_ins,
            checkpoints: Vec::new(),
            static_entry: false,
            intercepted: 0,
        }
    }

    /// Runs the entry frame of the transaction in static mode.
    pub fn with_static_entry(mut self, is_static: bool) -> Self {
        self.static_entry = is_static;
        self
    }

    fn checkpoint(&mut self, relay: bool) {
        self.checkpoints.push(Checkpoint {
            stand_ins: Some(self.stand_ins.clone()),
            relay,
        });
    }

    fn restore(&mut self, checkpoint: Checkpoint, ok: bool) {
        if let (false, Some(stand_ins)) = (ok, checkpoint.stand_ins) {
            *self.stand_ins = stand_ins;
        }
    }

    /// Resolves a call to the stand-in at `inputs.bytecode_address`.
    ///
    /// A relay request rewrites `inputs` into the downstream call made by
    /// the stand-in. When the downstream target is itself a stand-in the
    /// loop answers it too.
    fn route<CTX: ContextTr>(&mut self, context: &mut CTX, inputs: &mut CallInputs, data: Bytes) -> Option<Route> {
        let mut relay = false;
        let mut data = data;
        // Undoes the dispatch if the value cannot be paid.
        let mut unpaid = (!inputs.value.get().is_zero()).then(|| self.stand_ins.clone());

        loop {
            let address = inputs.bytecode_address;
            let stand_in = self.stand_ins.get_mut(&address)?;
            let call = IncomingCall::new(inputs.caller, data).with_value(inputs.value.get());

            match stand_in.handle(&call) {
                // Let the placeholder code run so the value transfer happens.
                Outcome::Accept => return Some(Route::Run { relay }),
                Outcome::Return(output) => {
                    if let Err(halt) = pay(context, inputs) {
                        if let Some(stand_ins) = unpaid.take() {
                            *self.stand_ins = stand_ins;
                        }
                        return Some(Route::Answer(halt, Bytes::new()));
                    }
                    let output = if relay { encode_relay_output(&output) } else { output };
                    return Some(Route::Answer(InstructionResult::Return, output));
                }
                Outcome::Revert(output) => return Some(Route::Answer(InstructionResult::Revert, output)),
                Outcome::Relay(request) => {
                    // The relay entry points are not payable.
                    if !inputs.value.get().is_zero() {
                        return Some(Route::Answer(InstructionResult::Revert, Bytes::new()));
                    }
                    tracing::debug!(stand_in = %address, target = %request.target, kind = ?request.kind, "relay from inside execution");
                    data = redirect(inputs, address, request);
                    relay = true;
                    if !self.stand_ins.contains_key(&inputs.bytecode_address) {
                        return Some(Route::Run { relay });
                    }
                }
            }
        }
    }
}

/// Moves the call value from the caller to the stand-in.
fn pay<CTX: ContextTr>(context: &mut CTX, inputs: &CallInputs) -> Result<(), InstructionResult> {
    let CallValue::Transfer(value) = inputs.value else {
        return Ok(());
    };
    if value.is_zero() {
        return Ok(());
    }
    match context.journal_mut().transfer(inputs.caller, inputs.target_address, value) {
        Ok(None) => Ok(()),
        Ok(Some(err)) => Err(err.into()),
        Err(_) => Err(InstructionResult::FatalExternalError),
    }
}

/// Rewrites `inputs` into the call `stand_in` makes for `request`.
fn redirect(inputs: &mut CallInputs, stand_in: Address, request: RelayRequest) -> Bytes {
    let RelayRequest { target, data, kind } = request;
    inputs.caller = stand_in;
    inputs.target_address = target;
    inputs.bytecode_address = target;
    inputs.known_bytecode = None;
    inputs.input = CallInput::Bytes(data.clone());
    inputs.value = CallValue::Transfer(U256::ZERO);
    if kind == RelayKind::StaticCall {
        inputs.is_static = true;
    }
    data
}

impl<CTX: ContextTr> Inspector<CTX, EthInterpreter> for StandInInspector<'_> {
    fn call(&mut self, context: &mut CTX, inputs: &mut CallInputs) -> Option<CallOutcome> {
        if std::mem::take(&mut self.static_entry) {
            inputs.is_static = true;
        }

        let route = if self.stand_ins.contains_key(&inputs.bytecode_address) {
            let data = inputs.input.bytes(&*context);
            self.route(context, inputs, data)
        } else {
            None
        };

        match route {
            None => {
                self.checkpoint(false);
                None
            }
            Some(Route::Run { relay }) => {
                self.checkpoint(relay);
                None
            }
            Some(Route::Answer(result, output)) => {
                self.intercepted += 1;
                self.checkpoints.push(Checkpoint {
                    stand_ins: None,
                    relay: false,
                });
                Some(CallOutcome::new(
                    InterpreterResult::new(result, output, Gas::new(inputs.gas_limit)),
                    inputs.return_memory_offset.clone(),
                ))
            }
        }
    }

    fn call_end(&mut self, _context: &mut CTX, _inputs: &CallInputs, outcome: &mut CallOutcome) {
        let Some(checkpoint) = self.checkpoints.pop() else {
            return;
        };
        let result = outcome.result.result;

        if checkpoint.relay {
            if result.is_ok() {
                outcome.result.output = encode_relay_output(&outcome.result.output);
            } else if !result.is_revert() {
                // Halts surface to the relay invoker as an empty revert.
                tracing::warn!(?result, "relay halted downstream");
                outcome.result.result = InstructionResult::Revert;
                outcome.result.output = Bytes::new();
            }
        }

        self.restore(checkpoint, result.is_ok());
    }

    fn create(&mut self, _context: &mut CTX, _inputs: &mut CreateInputs) -> Option<CreateOutcome> {
        self.static_entry = false;
        self.checkpoint(false);
        None
    }

    fn create_end(&mut self, _context: &mut CTX, _inputs: &CreateInputs, outcome: &mut CreateOutcome) {
        if let Some(checkpoint) = self.checkpoints.pop() {
            self.restore(checkpoint, outcome.result.result.is_ok());
        }
    }
}
