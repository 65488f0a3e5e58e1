//! Working memory of one session.

use std::sync::atomic::{AtomicU64, Ordering};

use fixpoint_foundation::{Error, FactHandle, Result, TypeId, Value, VersionedHandle};
use tracing::{trace, warn};

use crate::action::FactAction;
use crate::key_store::KeyedFactStorage;
use crate::meta::{RuntimeMeta, StorageId};
use crate::type_memory::{FactRecord, TypeMemory};

/// All type memories of a session plus its fact handle allocator.
#[derive(Debug)]
pub struct SessionMemory {
    types: Vec<TypeMemory>,
    next_id: AtomicU64,
    capacity: usize,
}

impl SessionMemory {
    /// Creates memories for every type declared in `meta`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the metadata is inconsistent.
    pub fn new(meta: &RuntimeMeta) -> Result<Self> {
        Self::with_capacity(meta, 0)
    }

    /// Creates memories whose fact tables start sized for `capacity` facts per type.
    ///
    /// # Errors
    ///
    /// Returns [`fixpoint_foundation::ErrorKind::CapacityExceeded`] for an
    /// impossible capacity, or an internal error if the metadata is inconsistent.
    pub fn with_capacity(meta: &RuntimeMeta, capacity: usize) -> Result<Self> {
        let mut memory = Self {
            types: Vec::with_capacity(meta.type_count()),
            next_id: AtomicU64::new(1),
            capacity,
        };
        memory.refresh(meta)?;
        Ok(memory)
    }

    /// Brings type memories in line with `meta` after deployment.
    ///
    /// Every type is classified before any memory changes, so a failure
    /// leaves the session exactly as it was.
    ///
    /// # Errors
    ///
    /// Propagates alpha condition failures while classifying existing facts.
    pub fn refresh(&mut self, meta: &RuntimeMeta) -> Result<()> {
        let mut pending = Vec::new();
        let mut added = Vec::new();
        for type_meta in meta.types() {
            let index = type_meta.id().index();
            match self.types.get(index) {
                Some(memory) => pending.push((index, memory.prepare_refresh(type_meta)?)),
                None => added.push(TypeMemory::with_capacity(type_meta, self.capacity)?),
            }
        }
        for (index, update) in pending {
            if let Some(memory) = self.types.get_mut(index) {
                memory.apply_refresh(update);
            }
        }
        self.types.extend(added);
        Ok(())
    }

    /// Allocates a handle for a fact about to be inserted.
    pub fn allocate(&self, type_id: TypeId) -> FactHandle {
        FactHandle::new(type_id, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Applies actions in order, returning the number that took effect.
    ///
    /// Updates and deletes of handles that are not live are skipped.
    ///
    /// # Errors
    ///
    /// Propagates alpha condition failures. Actions before the failing one
    /// stay applied; the failing action and everything after it are discarded.
    pub fn apply(&mut self, actions: Vec<FactAction>, meta: &RuntimeMeta) -> Result<usize> {
        let mut applied = 0;
        let mut actions = actions.into_iter();
        while let Some(action) = actions.next() {
            let handle = action.handle();
            match self.apply_one(action, meta) {
                Ok(true) => {
                    trace!(?handle, "applied fact action");
                    applied += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        ?handle,
                        applied,
                        discarded = actions.len(),
                        "fact action failed; rest of batch discarded"
                    );
                    return Err(err);
                }
            }
        }
        Ok(applied)
    }

    fn apply_one(&mut self, action: FactAction, meta: &RuntimeMeta) -> Result<bool> {
        let handle = action.handle();
        let Some(type_meta) = meta.type_meta(handle.type_id) else {
            warn!(?handle, "action targets an undeclared type; skipped");
            return Ok(false);
        };
        let memory = self
            .types
            .get_mut(handle.type_id.index())
            .ok_or_else(|| Error::internal(format!("no memory for {:?}", handle.type_id)))?;
        let took_effect = match action {
            FactAction::Insert { handle, value } => {
                memory.insert(handle, value, type_meta)?;
                true
            }
            FactAction::Update { handle, value } => {
                memory.update(handle, value, type_meta)?.is_some()
            }
            FactAction::Delete { handle } => memory.delete(handle).is_some(),
        };
        if !took_effect {
            warn!(?handle, "fact is not live; action skipped");
        }
        Ok(took_effect)
    }

    /// Ends the round for every type, returning the storages that lost a key.
    pub fn commit(&mut self) -> Vec<StorageId> {
        self.types.iter_mut().flat_map(TypeMemory::commit).collect()
    }

    /// Drops all facts. Handle numbering continues.
    pub fn clear(&mut self) {
        for memory in &mut self.types {
            memory.clear();
        }
    }

    /// Returns true if any keyed storage holds delta content.
    #[must_use]
    pub fn has_delta(&self) -> bool {
        self.types.iter().any(TypeMemory::has_delta)
    }

    /// Returns the memory of a type.
    #[must_use]
    pub fn type_memory(&self, type_id: TypeId) -> Option<&TypeMemory> {
        self.types.get(type_id.index())
    }

    /// Returns a live fact's record.
    #[must_use]
    pub fn get(&self, handle: FactHandle) -> Option<&FactRecord> {
        self.type_memory(handle.type_id)?.get(handle)
    }

    /// Returns a live fact's value.
    #[must_use]
    pub fn value(&self, handle: FactHandle) -> Option<&Value> {
        self.get(handle).map(|r| &r.value)
    }

    /// Returns true if `fact` names a live fact at its current version.
    #[must_use]
    pub fn is_current(&self, fact: &VersionedHandle) -> bool {
        self.type_memory(fact.handle.type_id)
            .is_some_and(|m| m.is_current(fact))
    }

    /// Returns a keyed storage.
    ///
    /// # Panics
    ///
    /// Panics if no such storage exists; nodes only reference storages that
    /// their deployment registered.
    #[must_use]
    pub fn storage(&self, id: StorageId) -> &KeyedFactStorage {
        let Some(storage) = self
            .type_memory(id.type_id)
            .and_then(|m| m.storage(id))
        else {
            panic!("no keyed storage {id:?}");
        };
        storage
    }

    /// Iterates over all live facts, type by type.
    pub fn facts(&self) -> impl Iterator<Item = (FactHandle, &Value)> + '_ {
        self.types
            .iter()
            .flat_map(|m| m.facts().map(|(h, r)| (h, &r.value)))
    }

    /// Iterates over the live facts of one type.
    pub fn facts_of(&self, type_id: TypeId) -> impl Iterator<Item = (FactHandle, &Value)> + '_ {
        self.type_memory(type_id)
            .into_iter()
            .flat_map(|m| m.facts().map(|(h, r)| (h, &r.value)))
    }

    /// Returns the total number of live facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.iter().map(TypeMemory::len).sum()
    }

    /// Returns true if no facts are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.iter().all(TypeMemory::is_empty)
    }
}

impl Clone for SessionMemory {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            next_id: AtomicU64::new(self.next_id.load(Ordering::Relaxed)),
            capacity: self.capacity,
        }
    }
}
