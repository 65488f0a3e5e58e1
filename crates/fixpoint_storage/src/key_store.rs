//! Three-region keyed fact storage.
//!
//! Facts are grouped by the values of one fields key. Every distinct value row
//! lives in one of three regions:
//!
//! | Region       | Key existed before the round | Facts         |
//! |--------------|------------------------------|---------------|
//! | `KnownKnown` | yes                          | committed     |
//! | `NewNew`     | no                           | new           |
//! | `KnownNew`   | yes                          | new           |
//!
//! Joins read the two delta regions to enumerate only combinations that
//! contain something new. [`KeyedFactStorage::commit`] folds the deltas into
//! `KnownKnown` once per round.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fixpoint_foundation::{LinearHash, Value, VersionedHandle, hash_of};

/// Region of a keyed storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyMode {
    /// Key and facts existed before this round.
    KnownKnown = 0,
    /// Key is new this round.
    NewNew = 1,
    /// Key existed before; these facts are new.
    KnownNew = 2,
}

// Region arrays are indexed by ordinal; the stable region must come first.
const _: () = assert!(KeyMode::KnownKnown as u8 == 0);

impl KeyMode {
    /// All modes in ordinal order.
    pub const ALL: [Self; 3] = [Self::KnownKnown, Self::NewNew, Self::KnownNew];

    /// The two delta modes.
    pub const DELTA: [Self; 2] = [Self::NewNew, Self::KnownNew];

    /// Returns the ordinal of this mode.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Returns true for the modes holding content new in this round.
    #[must_use]
    pub const fn is_delta(self) -> bool {
        !matches!(self, Self::KnownKnown)
    }
}

/// A tuple of field values identifying one join key, with a cached hash.
#[derive(Clone)]
pub struct ValueRow {
    values: Arc<[Value]>,
    hash: u64,
}

impl ValueRow {
    /// Creates a row, hashing its values once.
    #[must_use]
    pub fn new(values: Arc<[Value]>) -> Self {
        let hash = hash_of(&*values);
        Self { values, hash }
    }

    /// Returns the row's values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the cached hash.
    #[must_use]
    pub const fn hash_code(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for ValueRow {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.values == other.values
    }
}

impl Eq for ValueRow {}

impl Hash for ValueRow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for ValueRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.iter()).finish()
    }
}

/// A value row and the versioned facts filed under it in one region.
#[derive(Clone, Debug)]
pub struct KeyEntry {
    /// The join key.
    pub row: ValueRow,
    /// Facts with this key, in insertion order.
    pub facts: Vec<VersionedHandle>,
}

impl KeyEntry {
    fn new(row: ValueRow) -> Self {
        Self {
            row,
            facts: Vec::new(),
        }
    }
}

/// Facts of one type grouped by one fields key, split into three regions.
#[derive(Clone, Debug, Default)]
pub struct KeyedFactStorage {
    regions: [LinearHash<KeyEntry>; 3],
}

impl KeyedFactStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn region(&self, mode: KeyMode) -> &LinearHash<KeyEntry> {
        &self.regions[mode.ordinal()]
    }

    /// Files a new fact under `row`, returning the region it landed in.
    ///
    /// Keys already committed receive the fact under `KnownNew`; unseen keys
    /// are created (or extended) under `NewNew`.
    pub fn insert(&mut self, row: ValueRow, fact: VersionedHandle) -> KeyMode {
        let mode = if self.contains_key(KeyMode::KnownKnown, &row) {
            KeyMode::KnownNew
        } else {
            KeyMode::NewNew
        };
        self.file(mode, row, fact);
        mode
    }

    /// Files a fact directly under `KnownKnown`.
    ///
    /// Used to populate a storage created after facts were already committed.
    pub fn insert_committed(&mut self, row: ValueRow, fact: VersionedHandle) {
        self.file(KeyMode::KnownKnown, row, fact);
    }

    fn file(&mut self, mode: KeyMode, row: ValueRow, fact: VersionedHandle) {
        let hash = row.hash_code();
        self.regions[mode.ordinal()]
            .compute_if_absent(hash, |e| e.row == row, || KeyEntry::new(row.clone()))
            .facts
            .push(fact);
    }

    /// Returns the facts filed under `row` in region `mode`.
    #[must_use]
    pub fn facts(&self, mode: KeyMode, row: &ValueRow) -> &[VersionedHandle] {
        self.region(mode)
            .get(row.hash_code(), |e| e.row == *row)
            .map_or(&[][..], |e| e.facts.as_slice())
    }

    /// Iterates over the key entries of region `mode`.
    pub fn keys(&self, mode: KeyMode) -> impl Iterator<Item = &KeyEntry> + '_ {
        self.region(mode).iter()
    }

    /// Returns the number of distinct keys in region `mode`.
    #[must_use]
    pub fn key_count(&self, mode: KeyMode) -> usize {
        self.region(mode).len()
    }

    /// Returns true if region `mode` holds `row`.
    #[must_use]
    pub fn contains_key(&self, mode: KeyMode, row: &ValueRow) -> bool {
        self.region(mode).contains(row.hash_code(), |e| e.row == *row)
    }

    /// Returns true if either delta region is non-empty.
    #[must_use]
    pub fn has_delta(&self) -> bool {
        KeyMode::DELTA.iter().any(|m| !self.region(*m).is_empty())
    }

    /// Merges both delta regions into `KnownKnown` and clears them.
    pub fn commit(&mut self) {
        let [main, new_new, known_new] = &mut self.regions;
        for delta in [new_new, known_new] {
            for entry in delta.drain() {
                let KeyEntry { row, facts } = entry;
                let hash = row.hash_code();
                main.compute_if_absent(hash, |e| e.row == row, || KeyEntry::new(row.clone()))
                    .facts
                    .extend(facts);
            }
        }
    }

    /// Drops facts of `KnownKnown` that are no longer live.
    ///
    /// Keys left without facts are removed. Returns true if any key vanished.
    pub fn purge(&mut self, mut is_live: impl FnMut(&VersionedHandle) -> bool) -> bool {
        let mut vanished = false;
        let mut cursor = self.regions[KeyMode::KnownKnown.ordinal()].cursor();
        while let Some(entry) = cursor.next_entry() {
            entry.facts.retain(|f| is_live(f));
            if entry.facts.is_empty() {
                cursor.remove_current();
                vanished = true;
            }
        }
        vanished
    }

    /// Empties all regions.
    pub fn clear(&mut self) {
        for region in &mut self.regions {
            region.clear();
        }
    }

    /// Returns the total number of filed facts across all regions.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.regions
            .iter()
            .flat_map(LinearHash::iter)
            .map(|e| e.facts.len())
            .sum()
    }
}
