//! Growable bitmask.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A growable set of bit flags backed by 64-bit words.
///
/// Reading a bit beyond the allocated words yields `false`. Equality ignores
/// trailing cleared words.
#[derive(Clone, Default)]
pub struct Bits {
    words: Vec<u64>,
}

impl Bits {
    /// Creates an empty bitmask.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Creates a bitmask with room for `len` bits, all cleared.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// Returns the value of bit `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    /// Sets bit `index` to `value`, growing as needed.
    pub fn set(&mut self, index: usize, value: bool) {
        let word = index / 64;
        if word >= self.words.len() {
            if !value {
                return;
            }
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << (index % 64);
        if value {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }

    /// Clears every bit while keeping the allocation.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns true if no bit is set.
    #[must_use]
    pub fn none(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    fn significant(&self) -> &[u64] {
        let end = self.words.iter().rposition(|w| *w != 0).map_or(0, |p| p + 1);
        &self.words[..end]
    }

    /// Iterates over the indices of set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            (0..64usize).filter(move |b| word & (1u64 << b) != 0).map(move |b| w * 64 + b)
        })
    }
}

impl PartialEq for Bits {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for Bits {}

impl Hash for Bits {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ones()).finish()
    }
}
