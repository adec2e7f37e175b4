//! Stub builder: fluent, per-function programming of a stand-in.
//!
//! A stub accumulates administrative actions and sends them when awaited:
//!
//! ```ignore
//! mock.stub("increment")?.returns([uint(1)])?.returns([uint(2)])?.await?;
//! ```
//!
//! The first action of a round overwrites the key's queue, later ones
//! append, so a round never inherits entries from an earlier round.
//! Awaiting always returns the stub to idle, whether the commit succeeded
//! or not.

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Function;
use alloy_primitives::Address;
use doppel_core::{
    AdminCall, CallKey, DoppelError, DoppelResult, ResponseEntry, DEFAULT_RECEIVE_REVERT_REASON, DEFAULT_REVERT_REASON,
};
use smallvec::SmallVec;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use crate::backend::Backend;
use crate::codec;

// ---------------------------------------------------------------------------
// Pending round
// ---------------------------------------------------------------------------

/// One round of not-yet-sent actions.
///
/// A stub without a round is idle. The first fluent call opens one and
/// committing or any programming error closes it.
#[derive(Debug)]
struct Pending {
    /// Key for actions appended from now on.
    key: CallKey,
    args_bound: bool,
    revert_terminal: bool,
    actions: SmallVec<[AdminCall; 4]>,
}

impl Pending {
    fn new(key: CallKey) -> Self {
        Self {
            key,
            args_bound: false,
            revert_terminal: false,
            actions: SmallVec::new(),
        }
    }

    fn push(&mut self, entry: ResponseEntry) {
        let key = self.key.clone();
        let action = if self.actions.is_empty() {
            AdminCall::SetResponse { key, entry }
        } else {
            AdminCall::QueueResponse { key, entry }
        };
        self.actions.push(action);
    }
}

// ---------------------------------------------------------------------------
// Stub
// ---------------------------------------------------------------------------

/// Programming interface for one function (one overload) of a mocked ABI.
pub struct Stub<B> {
    backend: Arc<B>,
    stand_in: Address,
    function: Function,
    round: Option<Pending>,
}

impl<B: Backend> Stub<B> {
    pub fn new(backend: Arc<B>, stand_in: Address, function: Function) -> Self {
        Self {
            backend,
            stand_in,
            function,
            round: None,
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    /// Number of actions waiting for the next commit.
    pub fn pending_len(&self) -> usize {
        self.round.as_ref().map_or(0, |p| p.actions.len())
    }

    /// Queues a return of `values`, encoded against the function's outputs.
    pub fn returns<I>(&mut self, values: I) -> DoppelResult<&mut Self>
    where
        I: IntoIterator<Item = DynSolValue>,
    {
        self.ensure_not_terminal()?;
        if self.function.outputs.is_empty() {
            return self.fail(DoppelError::VoidReturn);
        }
        let values: Vec<DynSolValue> = values.into_iter().collect();
        let encoded = match codec::encode_outputs(&self.function, &values) {
            Ok(encoded) => encoded,
            Err(e) => return self.fail(e),
        };
        self.pending().push(ResponseEntry::Return(encoded));
        Ok(self)
    }

    /// Queues a revert with the default reason. Must be the last action.
    pub fn reverts(&mut self) -> DoppelResult<&mut Self> {
        self.reverts_with_reason(DEFAULT_REVERT_REASON)
    }

    /// Queues a revert with `reason` (may be empty). Must be the last action.
    pub fn reverts_with_reason(&mut self, reason: &str) -> DoppelResult<&mut Self> {
        self.ensure_not_terminal()?;
        let pending = self.pending();
        pending.push(ResponseEntry::revert(reason));
        pending.revert_terminal = true;
        Ok(self)
    }

    /// Scopes every later action of this round to calls with exactly `params`.
    pub fn with_args<I>(&mut self, params: I) -> DoppelResult<&mut Self>
    where
        I: IntoIterator<Item = DynSolValue>,
    {
        if self.pending().args_bound {
            return self.fail(DoppelError::WithArgsTwice);
        }
        let params: Vec<DynSolValue> = params.into_iter().collect();
        let call_data = match codec::encode_call(&self.function, &params) {
            Ok(data) => data,
            Err(e) => return self.fail(e),
        };
        let pending = self.pending();
        pending.key = CallKey::from_raw(&call_data);
        pending.args_bound = true;
        Ok(self)
    }

    /// Sends the pending actions in order, stopping at the first failure.
    ///
    /// Actions committed before a failure stay committed.
    pub async fn commit(&mut self) -> DoppelResult<()> {
        let Some(pending) = self.round.take() else {
            return Ok(());
        };

        let signature = self.function.signature();
        for (i, action) in pending.actions.into_iter().enumerate() {
            tracing::debug!(
                stand_in = %self.stand_in,
                function = %signature,
                step = i,
                action = ?action,
                "committing stub action"
            );
            self.backend.call(self.stand_in, action.encode()).await?;
        }
        Ok(())
    }

    fn pending(&mut self) -> &mut Pending {
        let selector = self.function.selector();
        self.round
            .get_or_insert_with(|| Pending::new(CallKey::Selector(selector)))
    }

    fn ensure_not_terminal(&mut self) -> DoppelResult<()> {
        if self.round.as_ref().is_some_and(|p| p.revert_terminal) {
            self.round = None;
            return Err(DoppelError::RevertNotLast);
        }
        Ok(())
    }

    /// Drops the pending round and returns `err`.
    fn fail(&mut self, err: DoppelError) -> DoppelResult<&mut Self> {
        self.round = None;
        Err(err)
    }
}

impl<'a, B: Backend> IntoFuture for &'a mut Stub<B> {
    type Output = DoppelResult<()>;
    type IntoFuture = Pin<Box<dyn Future<Output = DoppelResult<()>> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.commit())
    }
}

// ---------------------------------------------------------------------------
// Receive pseudo-stub
// ---------------------------------------------------------------------------

/// Native-value receive path. It only supports reverting: a value
/// transfer has no payload to return.
pub struct ReceiveStub<B> {
    backend: Arc<B>,
    stand_in: Address,
}

impl<B: Backend> ReceiveStub<B> {
    pub fn new(backend: Arc<B>, stand_in: Address) -> Self {
        Self { backend, stand_in }
    }

    pub fn returns<I>(&self, _values: I) -> DoppelResult<()>
    where
        I: IntoIterator<Item = DynSolValue>,
    {
        Err(DoppelError::ReceiveReturn)
    }

    pub fn with_args<I>(&self, _params: I) -> DoppelResult<()>
    where
        I: IntoIterator<Item = DynSolValue>,
    {
        Err(DoppelError::ReceiveReturn)
    }

    /// Makes every later value transfer revert with `"Mock Revert"`.
    pub async fn reverts(&self) -> DoppelResult<()> {
        self.reverts_with_reason(DEFAULT_RECEIVE_REVERT_REASON).await
    }

    pub async fn reverts_with_reason(&self, reason: &str) -> DoppelResult<()> {
        let admin = AdminCall::SetReceiveRevert {
            reason: reason.to_string(),
        };
        self.backend.call(self.stand_in, admin.encode()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{find_function, parse_abi};
    use alloy_primitives::{Bytes, U256};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records administrative messages instead of delivering them.
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<AdminCall>>,
    }

    impl Recorder {
        fn sent(&self) -> Vec<AdminCall> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for Recorder {
        async fn call(&self, _to: Address, data: Bytes) -> DoppelResult<Bytes> {
            let admin = AdminCall::decode(&data).unwrap().unwrap();
            self.sent.lock().unwrap().push(admin);
            Ok(Bytes::new())
        }

        async fn static_call(&self, to: Address, data: Bytes) -> DoppelResult<Bytes> {
            self.call(to, data).await
        }

        async fn send_value(&self, _to: Address, _value: U256) -> DoppelResult<()> {
            Ok(())
        }

        async fn code_at(&self, _address: Address) -> DoppelResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn deploy_stand_in(&self) -> DoppelResult<Address> {
            Ok(Address::ZERO)
        }
    }

    fn uint(n: u64) -> DynSolValue {
        DynSolValue::Uint(U256::from(n), 256)
    }

    fn stub(recorder: &Arc<Recorder>, signature: &str) -> Stub<Recorder> {
        let abi = parse_abi(
            "function add(uint256 value) returns (uint256)\nfunction poke()",
        )
        .unwrap();
        let function = find_function(&abi, signature).unwrap().clone();
        Stub::new(Arc::clone(recorder), Address::ZERO, function)
    }

    #[tokio::test]
    async fn first_action_sets_later_actions_queue() {
        let recorder = Arc::new(Recorder::default());
        let mut add = stub(&recorder, "add");
        add.returns([uint(1)]).unwrap().returns([uint(2)]).unwrap().reverts().unwrap();
        assert_eq!(add.pending_len(), 3);
        (&mut add).await.unwrap();

        let sent = recorder.sent();
        assert!(matches!(sent[0], AdminCall::SetResponse { .. }));
        assert!(matches!(sent[1], AdminCall::QueueResponse { .. }));
        assert!(matches!(
            &sent[2],
            AdminCall::QueueResponse { entry: ResponseEntry::Revert(r), .. } if r == DEFAULT_REVERT_REASON
        ));
    }

    #[tokio::test]
    async fn with_args_switches_key_to_exact() {
        let recorder = Arc::new(Recorder::default());
        let mut add = stub(&recorder, "add");
        add.with_args([uint(5)]).unwrap().returns([uint(5)]).unwrap();
        (&mut add).await.unwrap();

        match &recorder.sent()[0] {
            AdminCall::SetResponse { key, .. } => {
                assert!(key.is_exact());
                assert_eq!(key.to_bytes().len(), 36);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn programming_errors_leave_the_builder_idle() {
        let recorder = Arc::new(Recorder::default());
        let mut poke = stub(&recorder, "poke");
        poke.reverts().unwrap();
        assert!(matches!(poke.returns([uint(1)]), Err(DoppelError::RevertNotLast)));
        assert_eq!(poke.pending_len(), 0);

        assert!(matches!(poke.returns([uint(1)]), Err(DoppelError::VoidReturn)));
        (&mut poke).await.unwrap();
        assert!(recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn each_round_starts_from_the_selector_key() {
        let recorder = Arc::new(Recorder::default());
        let mut add = stub(&recorder, "add");
        add.with_args([uint(1)]).unwrap();
        assert_eq!(add.pending_len(), 0);
        add.returns([uint(1)]).unwrap();
        assert_eq!(add.pending_len(), 1);
        (&mut add).await.unwrap();
        assert_eq!(add.pending_len(), 0);

        add.returns([uint(2)]).unwrap();
        (&mut add).await.unwrap();
        match &recorder.sent()[..] {
            [AdminCall::SetResponse { key: first, .. }, AdminCall::SetResponse { key: second, .. }] => {
                assert!(first.is_exact());
                assert!(!second.is_exact());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn receive_stub_sends_receive_revert() {
        let recorder = Arc::new(Recorder::default());
        let receive = ReceiveStub::new(Arc::clone(&recorder), Address::ZERO);
        assert!(matches!(receive.returns([uint(1)]), Err(DoppelError::ReceiveReturn)));

        receive.reverts().await.unwrap();
        assert_eq!(
            recorder.sent(),
            vec![AdminCall::SetReceiveRevert {
                reason: DEFAULT_RECEIVE_REVERT_REASON.to_string()
            }]
        );
    }
}
