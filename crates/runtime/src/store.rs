//! Behavior store: programmed response queues keyed by call data.
//!
//! Selector keys and exact keys live in two independent maps. Lookup
//! precedence is the dispatcher's concern; the store only owns queues.

use alloy_primitives::{Bytes, Selector};
use doppel_core::{CallKey, ResponseEntry};
use std::collections::{HashMap, VecDeque};

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Ordered responses for one key.
///
/// Consumption never drops the last entry: once a single entry remains it
/// is returned on every call until the queue is overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseQueue {
    entries: VecDeque<ResponseEntry>,
}

impl ResponseQueue {
    pub fn single(entry: ResponseEntry) -> Self {
        Self {
            entries: VecDeque::from([entry]),
        }
    }

    pub fn push(&mut self, entry: ResponseEntry) {
        self.entries.push_back(entry);
    }

    /// Pops the front entry, or clones it when it is the sticky tail.
    pub fn consume(&mut self) -> Option<ResponseEntry> {
        if self.entries.len() > 1 {
            self.entries.pop_front()
        } else {
            self.entries.front().cloned()
        }
    }

    pub fn peek(&self) -> Option<&ResponseEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// At most one queue per distinct key. An exact key and the selector key
/// of the same function are unrelated entries.
#[derive(Debug, Clone, Default)]
pub struct BehaviorStore {
    exact: HashMap<Bytes, ResponseQueue>,
    selector: HashMap<Selector, ResponseQueue>,
}

impl BehaviorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the queue for `key` with a brand-new single-entry queue.
    pub fn set(&mut self, key: CallKey, entry: ResponseEntry) {
        let queue = ResponseQueue::single(entry);
        match key {
            CallKey::Selector(sel) => {
                self.selector.insert(sel, queue);
            }
            CallKey::Exact(data) => {
                self.exact.insert(data, queue);
            }
        }
    }

    /// Appends to the queue for `key`, creating it when absent.
    pub fn append(&mut self, key: CallKey, entry: ResponseEntry) {
        let queue = match key {
            CallKey::Selector(sel) => self.selector.entry(sel).or_default(),
            CallKey::Exact(data) => self.exact.entry(data).or_default(),
        };
        queue.push(entry);
    }

    pub fn exact_mut(&mut self, call_data: &Bytes) -> Option<&mut ResponseQueue> {
        self.exact.get_mut(call_data)
    }

    pub fn selector_mut(&mut self, selector: &Selector) -> Option<&mut ResponseQueue> {
        self.selector.get_mut(selector)
    }

    pub fn get(&self, key: &CallKey) -> Option<&ResponseQueue> {
        match key {
            CallKey::Selector(sel) => self.selector.get(sel),
            CallKey::Exact(data) => self.exact.get(data),
        }
    }

    /// Number of keys holding a queue, across both granularities.
    pub fn len(&self) -> usize {
        self.exact.len() + self.selector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.selector.is_empty()
    }
}
