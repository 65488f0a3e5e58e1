//! Buffered fact actions.

use fixpoint_foundation::{FactHandle, Value};

/// One pending change to working memory.
#[derive(Clone, Debug, PartialEq)]
pub enum FactAction {
    /// Insert a new fact under a pre-allocated handle.
    Insert {
        /// Handle allocated for the fact.
        handle: FactHandle,
        /// The fact's value.
        value: Value,
    },
    /// Replace the value of an existing fact.
    Update {
        /// Fact to update.
        handle: FactHandle,
        /// New value.
        value: Value,
    },
    /// Remove a fact.
    Delete {
        /// Fact to remove.
        handle: FactHandle,
    },
}

impl FactAction {
    /// Returns the handle this action targets.
    #[must_use]
    pub const fn handle(&self) -> FactHandle {
        match self {
            Self::Insert { handle, .. } | Self::Update { handle, .. } | Self::Delete { handle } => {
                *handle
            }
        }
    }
}

/// Ordered buffer of fact actions applied at the start of a fire-cycle round.
#[derive(Clone, Debug, Default)]
pub struct ActionBuffer {
    actions: Vec<FactAction>,
}

impl ActionBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action.
    pub fn push(&mut self, action: FactAction) {
        self.actions.push(action);
    }

    /// Buffers an insert.
    pub fn insert(&mut self, handle: FactHandle, value: Value) {
        self.push(FactAction::Insert { handle, value });
    }

    /// Buffers an update.
    pub fn update(&mut self, handle: FactHandle, value: Value) {
        self.push(FactAction::Update { handle, value });
    }

    /// Buffers a delete.
    pub fn delete(&mut self, handle: FactHandle) {
        self.push(FactAction::Delete { handle });
    }

    /// Returns the number of buffered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Iterates over buffered actions in order.
    pub fn iter(&self) -> impl Iterator<Item = &FactAction> + '_ {
        self.actions.iter()
    }

    /// Moves all buffered actions out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<FactAction> {
        std::mem::take(&mut self.actions)
    }

    /// Moves all actions of `other` to the end of this buffer.
    pub fn append(&mut self, other: &mut Self) {
        self.actions.append(&mut other.actions);
    }

    /// Discards all buffered actions.
    pub fn clear(&mut self) {
        self.actions.clear();
    }
}
