//! Open-addressing hash table with tombstone deletion.
//!
//! [`LinearHash`] has no fixed key type: every operation takes the element's
//! hash and an equality closure from the caller, so the same table backs fact
//! records, join keys and field indices. [`LinearMap`] wraps it for ordinary
//! `K: Hash + Eq` keys.

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::bits::Bits;
use crate::error::{Error, ErrorKind};

/// Smallest table size.
pub const MIN_CAPACITY: usize = 2;

/// Largest table size. Growing beyond this is a fatal resource error.
pub const MAX_CAPACITY: usize = 1 << 30;

/// Hashes any `Hash` value with the shared deterministic hasher.
#[must_use]
pub fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Returns the table size needed to hold `elements` under a 0.75 load factor.
fn table_size_for(elements: usize) -> usize {
    elements
        .saturating_mul(4)
        .div_ceil(3)
        .max(MIN_CAPACITY)
        .checked_next_power_of_two()
        .unwrap_or(usize::MAX)
}

fn capacity_exceeded(requested: usize) -> Error {
    Error::new(ErrorKind::CapacityExceeded { requested })
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

/// Linear-probing hash set over elements of type `E`.
///
/// Deletion clears the slot and sets its tombstone bit so probe chains stay
/// intact; later inserts reuse the first tombstone on their chain. A side array
/// records the order in which slots were first occupied, so iteration costs
/// O(occupied) rather than O(capacity).
///
/// Resize policy, checked before every insert and after removals:
/// - grow ×2 when the live size would exceed 0.75 of capacity;
/// - shrink when the live size drops below 0.1875 of capacity;
/// - rebuild in place when tombstones outnumber live elements.
#[derive(Clone)]
pub struct LinearHash<E> {
    slots: Vec<Option<(u64, E)>>,
    deleted: Bits,
    order: Vec<usize>,
    size: usize,
    deletes: usize,
    min_capacity: usize,
}

impl<E> Default for LinearHash<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> LinearHash<E> {
    /// Creates an empty table of minimum capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::allocate(MIN_CAPACITY)
    }

    /// Creates a table able to hold `elements` without growing.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CapacityExceeded`] if the required table size is
    /// larger than [`MAX_CAPACITY`].
    pub fn try_with_capacity(elements: usize) -> crate::Result<Self> {
        let capacity = table_size_for(elements);
        if capacity > MAX_CAPACITY {
            return Err(capacity_exceeded(elements));
        }
        Ok(Self::allocate(capacity))
    }

    fn allocate(capacity: usize) -> Self {
        Self {
            slots: empty_slots(capacity),
            deleted: Bits::with_len(capacity),
            order: Vec::new(),
            size: 0,
            deletes: 0,
            min_capacity: capacity,
        }
    }

    /// Returns the number of live elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Returns true if there are no live elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the current number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts `element`, replacing an equal live element in place.
    pub fn add_silent(&mut self, hash: u64, element: E, eq: impl Fn(&E, &E) -> bool) {
        let _ = self.replace(hash, element, eq);
    }

    /// Inserts `element`, returning true if no equal element was present.
    pub fn add_verbose(&mut self, hash: u64, element: E, eq: impl Fn(&E, &E) -> bool) -> bool {
        self.replace(hash, element, eq).is_none()
    }

    /// Inserts `element`, returning the equal element it replaced.
    ///
    /// # Panics
    ///
    /// Panics if growing the table would exceed [`MAX_CAPACITY`].
    pub fn replace(&mut self, hash: u64, element: E, eq: impl Fn(&E, &E) -> bool) -> Option<E> {
        self.ensure_insert_capacity();
        match self.probe(hash, |existing| eq(existing, &element)) {
            Probe::Found(index) => self.slots[index].replace((hash, element)).map(|(_, e)| e),
            Probe::Vacant(index) => {
                self.place(index, hash, element);
                None
            }
        }
    }

    /// Returns the element matching `matches`, inserting `producer()` if absent.
    ///
    /// # Panics
    ///
    /// Panics if growing the table would exceed [`MAX_CAPACITY`].
    pub fn compute_if_absent(
        &mut self,
        hash: u64,
        matches: impl FnMut(&E) -> bool,
        producer: impl FnOnce() -> E,
    ) -> &mut E {
        self.ensure_insert_capacity();
        match self.probe(hash, matches) {
            Probe::Found(index) => self.occupied_mut(index),
            Probe::Vacant(index) => self.place(index, hash, producer()),
        }
    }

    /// Looks up the element matching `matches`.
    pub fn get(&self, hash: u64, matches: impl FnMut(&E) -> bool) -> Option<&E> {
        match self.probe(hash, matches) {
            Probe::Found(index) => self.slots[index].as_ref().map(|(_, e)| e),
            Probe::Vacant(_) => None,
        }
    }

    /// Looks up the element matching `matches` for mutation.
    ///
    /// The mutation must not change the element's hash or equality.
    pub fn get_mut(&mut self, hash: u64, matches: impl FnMut(&E) -> bool) -> Option<&mut E> {
        match self.probe(hash, matches) {
            Probe::Found(index) => self.slots[index].as_mut().map(|(_, e)| e),
            Probe::Vacant(_) => None,
        }
    }

    /// Returns true if an element matches `matches`.
    pub fn contains(&self, hash: u64, matches: impl FnMut(&E) -> bool) -> bool {
        matches!(self.probe(hash, matches), Probe::Found(_))
    }

    /// Removes and returns the element matching `matches`.
    pub fn remove(&mut self, hash: u64, matches: impl FnMut(&E) -> bool) -> Option<E> {
        match self.probe(hash, matches) {
            Probe::Found(index) => {
                let removed = self.remove_at(index);
                self.shrink_if_sparse();
                removed
            }
            Probe::Vacant(_) => None,
        }
    }

    /// Removes every element for which `predicate` returns true.
    ///
    /// Returns the number of removed elements.
    pub fn delete_where(&mut self, mut predicate: impl FnMut(&E) -> bool) -> usize {
        let mut removed = 0;
        for position in 0..self.order.len() {
            let index = self.order[position];
            if self.slots[index].as_ref().is_some_and(|(_, e)| predicate(e)) {
                self.remove_at(index);
                removed += 1;
            }
        }
        if removed > 0 {
            self.shrink_if_sparse();
        }
        removed
    }

    /// Iterates over live elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &E> + '_ {
        self.order
            .iter()
            .filter_map(|&index| self.slots[index].as_ref().map(|(_, e)| e))
    }

    /// Iterates mutably over live elements in insertion order.
    ///
    /// Mutations must not change an element's hash or equality.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut E> + '_ {
        let order = &self.order;
        let mut live: Vec<Option<&mut E>> = self
            .slots
            .iter_mut()
            .map(|slot| slot.as_mut().map(|(_, e)| e))
            .collect();
        // `order` lists each slot once, so every element is taken at most once
        order.iter().filter_map(move |&index| live[index].take())
    }

    /// Returns a restartable cursor that can remove during traversal.
    pub fn cursor(&mut self) -> Cursor<'_, E> {
        Cursor {
            table: self,
            position: 0,
            current: None,
        }
    }

    /// Removes all elements and returns them in insertion order.
    ///
    /// Capacity is kept.
    pub fn drain(&mut self) -> Vec<E> {
        let mut out = Vec::with_capacity(self.size);
        for index in std::mem::take(&mut self.order) {
            if let Some((_, element)) = self.slots[index].take() {
                out.push(element);
            }
        }
        self.deleted.clear();
        self.size = 0;
        self.deletes = 0;
        out
    }

    /// Removes all elements, keeping capacity.
    pub fn clear(&mut self) {
        for index in std::mem::take(&mut self.order) {
            self.slots[index] = None;
        }
        self.deleted.clear();
        self.size = 0;
        self.deletes = 0;
    }

    // =========================================================================
    // Probing and placement
    // =========================================================================

    #[allow(clippy::cast_possible_truncation)]
    fn probe(&self, hash: u64, mut matches: impl FnMut(&E) -> bool) -> Probe {
        let mask = self.slots.len() - 1;
        let mut index = (hash as usize) & mask;
        let mut first_tombstone = None;
        for _ in 0..self.slots.len() {
            match &self.slots[index] {
                Some((h, element)) => {
                    if *h == hash && matches(element) {
                        return Probe::Found(index);
                    }
                }
                None if self.deleted.get(index) => {
                    first_tombstone.get_or_insert(index);
                }
                None => return Probe::Vacant(first_tombstone.unwrap_or(index)),
            }
            index = (index + 1) & mask;
        }
        match first_tombstone {
            Some(index) => Probe::Vacant(index),
            None => panic!(
                "linear probe visited all {} slots without finding a vacancy",
                self.slots.len()
            ),
        }
    }

    fn place(&mut self, index: usize, hash: u64, element: E) -> &mut E {
        if self.deleted.get(index) {
            self.deleted.set(index, false);
            self.deletes -= 1;
        } else {
            self.order.push(index);
        }
        self.size += 1;
        &mut self.slots[index].insert((hash, element)).1
    }

    fn occupied_mut(&mut self, index: usize) -> &mut E {
        match &mut self.slots[index] {
            Some((_, element)) => element,
            None => panic!("slot {index} reported as found but is vacant"),
        }
    }

    fn remove_at(&mut self, index: usize) -> Option<E> {
        let (_, element) = self.slots[index].take()?;
        self.deleted.set(index, true);
        self.size -= 1;
        self.deletes += 1;
        Some(element)
    }

    // =========================================================================
    // Resizing
    // =========================================================================

    fn ensure_insert_capacity(&mut self) {
        let capacity = self.capacity();
        let next = self.size + 1;
        if next * 4 > capacity * 3 {
            let grown = capacity * 2;
            assert!(grown <= MAX_CAPACITY, "{}", capacity_exceeded(grown));
            self.rebuild(grown);
        } else if (self.deletes > self.size && self.size > 2)
            || (next + self.deletes) * 4 > capacity * 3
        {
            self.rebuild(capacity);
        }
    }

    fn shrink_if_sparse(&mut self) {
        let capacity = self.capacity();
        if capacity > self.min_capacity && self.size * 16 < capacity * 3 {
            let target = table_size_for(self.size * 2).max(self.min_capacity);
            if target < capacity {
                self.rebuild(target);
                return;
            }
        }
        if self.deletes > self.size && self.size > 2 {
            self.rebuild(capacity);
        }
    }

    fn rebuild(&mut self, capacity: usize) {
        let mut old_slots = std::mem::replace(&mut self.slots, empty_slots(capacity));
        let old_order = std::mem::take(&mut self.order);
        self.deleted = Bits::with_len(capacity);
        self.size = 0;
        self.deletes = 0;
        for index in old_order {
            if let Some((hash, element)) = old_slots[index].take() {
                if let Probe::Vacant(vacant) = self.probe(hash, |_| false) {
                    self.place(vacant, hash, element);
                }
            }
        }
    }
}

fn empty_slots<E>(capacity: usize) -> Vec<Option<(u64, E)>> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}

impl<E: fmt::Debug> fmt::Debug for LinearHash<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Restartable traversal over a [`LinearHash`] in insertion order.
///
/// Removing through the cursor only tombstones the slot; the table is
/// compacted when the cursor is dropped.
pub struct Cursor<'a, E> {
    table: &'a mut LinearHash<E>,
    position: usize,
    current: Option<usize>,
}

impl<E> Cursor<'_, E> {
    /// Advances to the next live element.
    pub fn next_entry(&mut self) -> Option<&mut E> {
        while self.position < self.table.order.len() {
            let index = self.table.order[self.position];
            self.position += 1;
            if self.table.slots[index].is_some() {
                self.current = Some(index);
                return self.table.slots[index].as_mut().map(|(_, e)| e);
            }
        }
        self.current = None;
        None
    }

    /// Removes the element last returned by [`next_entry`](Self::next_entry).
    pub fn remove_current(&mut self) -> Option<E> {
        let index = self.current.take()?;
        self.table.remove_at(index)
    }

    /// Rewinds to the first element and returns the live size.
    pub fn reset(&mut self) -> usize {
        self.position = 0;
        self.current = None;
        self.table.size
    }
}

impl<E> Drop for Cursor<'_, E> {
    fn drop(&mut self) {
        self.table.shrink_if_sparse();
    }
}

// =============================================================================
// LinearMap
// =============================================================================

/// Key-value map over [`LinearHash`] for keys with ordinary `Hash + Eq`.
#[derive(Clone)]
pub struct LinearMap<K, V> {
    table: LinearHash<(K, V)>,
}

impl<K, V> Default for LinearMap<K, V> {
    fn default() -> Self {
        Self {
            table: LinearHash::new(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for LinearMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.table.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K: Hash + Eq, V> LinearMap<K, V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map able to hold `entries` without growing.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CapacityExceeded`] if `entries` is too large.
    pub fn try_with_capacity(entries: usize) -> crate::Result<Self> {
        Ok(Self {
            table: LinearHash::try_with_capacity(entries)?,
        })
    }

    /// Returns the number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the map is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Inserts a value, returning the previous value for `key`.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.table
            .replace(hash_of(&key), (key, value), |a, b| a.0 == b.0)
            .map(|(_, old)| old)
    }

    /// Returns the value for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table
            .get(hash_of(key), |(k, _)| <K as Borrow<Q>>::borrow(k) == key)
            .map(|(_, v)| v)
    }

    /// Returns the value for `key` for mutation.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table
            .get_mut(hash_of(key), |(k, _)| <K as Borrow<Q>>::borrow(k) == key)
            .map(|(_, v)| v)
    }

    /// Returns true if `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.contains(hash_of(key), |(k, _)| <K as Borrow<Q>>::borrow(k) == key)
    }

    /// Returns the value for `key`, inserting `default()` if absent.
    pub fn get_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V
    where
        K: Clone,
    {
        let hash = hash_of(&key);
        let seed = key.clone();
        let (_, value) =
            self.table
                .compute_if_absent(hash, |(k, _)| *k == key, move || (seed, default()));
        value
    }

    /// Removes and returns the value for `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table
            .remove(hash_of(key), |(k, _)| <K as Borrow<Q>>::borrow(k) == key)
            .map(|(_, v)| v)
    }

    /// Removes every entry for which `predicate` returns true.
    pub fn delete_where(&mut self, mut predicate: impl FnMut(&K, &V) -> bool) -> usize {
        self.table.delete_where(|(k, v)| predicate(k, v))
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.table.iter().map(|(k, v)| (k, v))
    }

    /// Iterates over entries with mutable values, in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> + '_ {
        self.table.iter_mut().map(|(k, v)| (&*k, v))
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.table.iter().map(|(k, _)| k)
    }

    /// Iterates over values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.table.iter().map(|(_, v)| v)
    }

    /// Removes all entries, keeping capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }
}
