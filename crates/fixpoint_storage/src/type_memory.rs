//! Per-type fact store.
//!
//! A [`TypeMemory`] owns the canonical values of every fact of one logical
//! type together with one [`KeyedFactStorage`] per `(fields key, alpha bucket)`
//! pair that some rule joins on. Facts are filed into storages as they are
//! inserted or updated; deletions take effect on the record immediately and
//! are swept out of the storages when the round commits.

use fixpoint_foundation::{
    Bits, Error, FactHandle, LinearMap, Result, TypeId, Value, VersionedHandle,
};

use crate::alpha::{AlphaBucket, compute_bits};
use crate::field::FieldsKey;
use crate::key_store::{KeyedFactStorage, ValueRow};
use crate::meta::{StorageId, TypeMeta};

/// The canonical state of one fact.
#[derive(Clone, Debug)]
pub struct FactRecord {
    /// Current value.
    pub value: Value,
    /// Number of updates applied since insertion.
    pub version: u32,
    /// Values of the type's active fields, by field index.
    pub field_values: Vec<Value>,
    /// Alpha mask over the type's registered single-fact conditions.
    pub alpha_bits: Bits,
}

impl FactRecord {
    fn versioned(&self, handle: FactHandle) -> VersionedHandle {
        VersionedHandle::new(handle, self.version)
    }
}

#[derive(Clone, Debug)]
struct StorageSlot {
    id: StorageId,
    fields_key: FieldsKey,
    bucket: AlphaBucket,
    store: KeyedFactStorage,
}

impl StorageSlot {
    fn accepts(&self, record: &FactRecord) -> bool {
        self.bucket.test(&record.alpha_bits)
    }

    fn row(&self, record: &FactRecord) -> ValueRow {
        ValueRow::new(self.fields_key.project(&record.field_values))
    }
}

/// Facts of one logical type and the keyed storages built over them.
#[derive(Clone, Debug)]
pub struct TypeMemory {
    type_id: TypeId,
    records: LinearMap<FactHandle, FactRecord>,
    slots: Vec<StorageSlot>,
    slot_index: LinearMap<StorageId, usize>,
    known_fields: usize,
    known_alpha: usize,
    round_inserts: Vec<VersionedHandle>,
    pending_deletes: Vec<FactHandle>,
    stale: bool,
}

impl TypeMemory {
    /// Creates an empty memory for a type and builds its storages.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the metadata names a storage whose
    /// fields key or bucket does not exist.
    pub fn new(meta: &TypeMeta) -> Result<Self> {
        Self::with_capacity(meta, 0)
    }

    /// Creates an empty memory sized for `capacity` facts.
    ///
    /// # Errors
    ///
    /// Returns [`fixpoint_foundation::ErrorKind::CapacityExceeded`] if the
    /// capacity cannot be allocated, or an internal error if the metadata is
    /// inconsistent.
    pub fn with_capacity(meta: &TypeMeta, capacity: usize) -> Result<Self> {
        let mut memory = Self {
            type_id: meta.id(),
            records: LinearMap::try_with_capacity(capacity)?,
            slots: Vec::new(),
            slot_index: LinearMap::new(),
            known_fields: meta.active_field_count(),
            known_alpha: meta.alpha_count(),
            round_inserts: Vec::new(),
            pending_deletes: Vec::new(),
            stale: false,
        };
        memory.refresh(meta)?;
        Ok(memory)
    }

    /// Returns the type id.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the number of live facts.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no facts are held.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn extract(meta: &TypeMeta, value: &Value) -> Vec<Value> {
        meta.active_fields().map(|f| f.read(value)).collect()
    }

    fn file(slots: &mut [StorageSlot], fact: VersionedHandle, record: &FactRecord) {
        for slot in slots.iter_mut().filter(|s| s.accepts(record)) {
            let row = slot.row(record);
            slot.store.insert(row, fact);
        }
    }

    /// Inserts a fact under a freshly allocated handle.
    ///
    /// # Errors
    ///
    /// Propagates alpha condition failures; nothing is stored in that case.
    pub fn insert(
        &mut self,
        handle: FactHandle,
        value: Value,
        meta: &TypeMeta,
    ) -> Result<VersionedHandle> {
        let field_values = Self::extract(meta, &value);
        let alpha_bits = compute_bits(meta.alpha_evaluators(), &field_values)?;
        let record = FactRecord {
            value,
            version: 0,
            field_values,
            alpha_bits,
        };
        let fact = record.versioned(handle);
        Self::file(&mut self.slots, fact, &record);
        self.records.insert(handle, record);
        self.round_inserts.push(fact);
        Ok(fact)
    }

    /// Replaces a fact's value and bumps its version.
    ///
    /// Alpha bits are recomputed only if an active field changed. Returns
    /// `None` if the handle is not live.
    ///
    /// # Errors
    ///
    /// Propagates alpha condition failures; the fact is left untouched.
    pub fn update(
        &mut self,
        handle: FactHandle,
        value: Value,
        meta: &TypeMeta,
    ) -> Result<Option<VersionedHandle>> {
        let Some(record) = self.records.get_mut(&handle) else {
            return Ok(None);
        };
        let field_values = Self::extract(meta, &value);
        if field_values != record.field_values {
            record.alpha_bits = compute_bits(meta.alpha_evaluators(), &field_values)?;
            record.field_values = field_values;
        }
        record.value = value;
        record.version += 1;
        let fact = record.versioned(handle);
        Self::file(&mut self.slots, fact, record);
        self.stale = true;
        Ok(Some(fact))
    }

    /// Removes a fact.
    ///
    /// Its storage entries stay until [`TypeMemory::commit`] purges them, and
    /// are filtered out as stale until then.
    pub fn delete(&mut self, handle: FactHandle) -> Option<FactRecord> {
        let record = self.records.remove(&handle)?;
        self.pending_deletes.push(handle);
        Some(record)
    }

    /// Returns a live fact's record.
    #[must_use]
    pub fn get(&self, handle: FactHandle) -> Option<&FactRecord> {
        self.records.get(&handle)
    }

    /// Returns a live fact's value.
    #[must_use]
    pub fn value(&self, handle: FactHandle) -> Option<&Value> {
        self.get(handle).map(|r| &r.value)
    }

    /// Returns true if `fact` names a live fact at its current version.
    #[must_use]
    pub fn is_current(&self, fact: &VersionedHandle) -> bool {
        self.get(fact.handle)
            .is_some_and(|r| r.version == fact.version)
    }

    /// Iterates over live facts in insertion order.
    pub fn facts(&self) -> impl Iterator<Item = (FactHandle, &FactRecord)> + '_ {
        self.records.iter().map(|(h, r)| (*h, r))
    }

    /// Returns the facts inserted since the last commit.
    #[must_use]
    pub fn round_inserts(&self) -> &[VersionedHandle] {
        &self.round_inserts
    }

    /// Returns the handles deleted since the last commit.
    #[must_use]
    pub fn pending_deletes(&self) -> &[FactHandle] {
        &self.pending_deletes
    }

    /// Returns a keyed storage.
    #[must_use]
    pub fn storage(&self, id: StorageId) -> Option<&KeyedFactStorage> {
        let index = *self.slot_index.get(&id)?;
        self.slots.get(index).map(|s| &s.store)
    }

    /// Iterates over the ids of all keyed storages.
    pub fn storage_ids(&self) -> impl Iterator<Item = StorageId> + '_ {
        self.slots.iter().map(|s| s.id)
    }

    /// Returns true if any storage holds delta content.
    #[must_use]
    pub fn has_delta(&self) -> bool {
        self.slots.iter().any(|s| s.store.has_delta())
    }

    /// Ends the round for this type.
    ///
    /// Folds delta regions into `KnownKnown` and, if facts were updated or
    /// deleted, drops stale handles. Returns the storages that lost a key.
    pub fn commit(&mut self) -> Vec<StorageId> {
        let purge = self.stale || !self.pending_deletes.is_empty();
        let records = &self.records;
        let mut vanished = Vec::new();
        for slot in &mut self.slots {
            slot.store.commit();
            if purge
                && slot.store.purge(|fact| {
                    records
                        .get(&fact.handle)
                        .is_some_and(|r| r.version == fact.version)
                })
            {
                vanished.push(slot.id);
            }
        }
        self.round_inserts.clear();
        self.pending_deletes.clear();
        self.stale = false;
        vanished
    }

    /// Drops every fact and empties every storage.
    pub fn clear(&mut self) {
        self.records.clear();
        for slot in &mut self.slots {
            slot.store.clear();
        }
        self.round_inserts.clear();
        self.pending_deletes.clear();
        self.stale = false;
    }

    /// Catches up with metadata registered after this memory was built.
    ///
    /// Newly active fields are extracted and new alpha conditions evaluated
    /// for every live fact. New storages are created and populated directly
    /// in `KnownKnown`. Nothing changes unless every fact was classified.
    ///
    /// # Errors
    ///
    /// Propagates alpha condition failures, or an internal error if the
    /// metadata is inconsistent.
    pub fn refresh(&mut self, meta: &TypeMeta) -> Result<()> {
        let pending = self.prepare_refresh(meta)?;
        self.apply_refresh(pending);
        Ok(())
    }

    /// Evaluates new metadata against every live fact without touching the memory.
    pub(crate) fn prepare_refresh(&self, meta: &TypeMeta) -> Result<PendingRefresh> {
        let field_count = meta.active_field_count().max(self.known_fields);
        let alpha_count = meta.alpha_count().max(self.known_alpha);
        let mut records = Vec::new();
        if field_count > self.known_fields || alpha_count > self.known_alpha {
            let fields: Vec<_> = meta.active_fields().skip(self.known_fields).collect();
            let alpha: Vec<_> = meta.alpha_evaluators().skip(self.known_alpha).collect();
            records.reserve(self.records.len());
            for (handle, record) in self.records.iter() {
                let mut field_values = record.field_values.clone();
                field_values.extend(fields.iter().map(|f| f.read(&record.value)));
                let mut bits = Vec::new();
                for evaluator in &alpha {
                    if evaluator.test(&field_values)? {
                        bits.push(evaluator.bit);
                    }
                }
                records.push(StagedRecord {
                    handle: *handle,
                    field_values,
                    bits,
                });
            }
        }

        let mut slots = Vec::new();
        for &id in meta.storages() {
            if self.slot_index.contains_key(&id) {
                continue;
            }
            let fields_key = meta
                .fields_key_by_id(id.fields_key)
                .cloned()
                .ok_or_else(|| Error::internal(format!("missing fields key for {id:?}")))?;
            let bucket = meta
                .bucket(id.bucket)
                .cloned()
                .ok_or_else(|| Error::internal(format!("missing alpha bucket for {id:?}")))?;
            slots.push(StorageSlot {
                id,
                fields_key,
                bucket,
                store: KeyedFactStorage::new(),
            });
        }

        Ok(PendingRefresh {
            field_count,
            alpha_count,
            records,
            slots,
        })
    }

    /// Writes a refresh computed by [`prepare_refresh`](Self::prepare_refresh).
    pub(crate) fn apply_refresh(&mut self, pending: PendingRefresh) {
        for staged in pending.records {
            if let Some(record) = self.records.get_mut(&staged.handle) {
                record.field_values = staged.field_values;
                for bit in staged.bits {
                    record.alpha_bits.set(bit, true);
                }
            }
        }
        self.known_fields = pending.field_count;
        self.known_alpha = pending.alpha_count;

        for mut slot in pending.slots {
            for (handle, record) in self.records.iter() {
                if slot.accepts(record) {
                    let row = slot.row(record);
                    slot.store.insert_committed(row, record.versioned(*handle));
                }
            }
            self.slot_index.insert(slot.id, self.slots.len());
            self.slots.push(slot);
        }
    }
}

#[derive(Debug)]
struct StagedRecord {
    handle: FactHandle,
    field_values: Vec<Value>,
    bits: Vec<usize>,
}

/// Field values, alpha bits and storages a memory gains from new metadata.
#[derive(Debug)]
pub(crate) struct PendingRefresh {
    field_count: usize,
    alpha_count: usize,
    records: Vec<StagedRecord>,
    slots: Vec<StorageSlot>,
}
