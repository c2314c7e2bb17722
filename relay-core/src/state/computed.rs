//! Computed Field Cache
//!
//! Each container instance keeps one [`ComputedSlot`] per computed field. A
//! slot caches the last evaluated value and re-evaluates only when one of its
//! dependencies changed.
//!
//! # How Slots Work
//!
//! 1. When a field is assigned, every computed field that transitively
//!    depends on it is marked dirty.
//!
//! 2. On the next read the slot re-evaluates its Var and becomes clean.
//!
//! 3. Separately, the slot remembers the value the client last received. The
//!    delta engine compares against it to decide whether a recomputed value
//!    belongs in the patch.
//!
//! Slots that are never read stay dirty until the next flush, so handlers
//! that only write fields do no evaluation work.

use crate::value::Value;

/// Dirty state for a computed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed. The value must be re-evaluated before use.
    Dirty,
}

/// Cached value of one computed field in one container instance.
#[derive(Debug, Clone)]
pub struct ComputedSlot {
    value: Value,
    state: MemoState,
    /// Last value sent to the client.
    synced: Value,
}

impl ComputedSlot {
    /// A slot that has never been evaluated.
    pub fn new() -> Self {
        Self {
            value: Value::Null,
            state: MemoState::Dirty,
            synced: Value::Null,
        }
    }

    pub fn state(&self) -> MemoState {
        self.state
    }

    pub fn is_clean(&self) -> bool {
        self.state == MemoState::Clean
    }

    /// The cached value, if it is up-to-date.
    pub fn cached(&self) -> Option<&Value> {
        match self.state {
            MemoState::Clean => Some(&self.value),
            MemoState::Dirty => None,
        }
    }

    /// Mark the slot as needing re-evaluation.
    pub fn mark_dirty(&mut self) {
        self.state = MemoState::Dirty;
    }

    /// Store a freshly evaluated value and mark the slot clean.
    pub fn store(&mut self, value: Value) {
        self.value = value;
        self.state = MemoState::Clean;
    }

    pub fn synced(&self) -> &Value {
        &self.synced
    }

    /// Record that the client now holds `value`. Returns false if it already
    /// did.
    pub fn sync(&mut self, value: &Value) -> bool {
        if self.synced == *value {
            return false;
        }
        self.synced = value.clone();
        true
    }
}

impl Default for ComputedSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
