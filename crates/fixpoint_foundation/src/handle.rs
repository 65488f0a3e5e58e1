//! Fact identifiers with update versions.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense index of a declared logical type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TypeId(u32);

impl TypeId {
    /// Creates a type id from its raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this type.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Stable identifier of one inserted fact.
///
/// The handle carries its logical type so the owning type memory is a direct
/// lookup. Handles are never reused within a session.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactHandle {
    /// Logical type of the fact.
    pub type_id: TypeId,
    /// Session-unique sequence number.
    pub id: u64,
}

impl FactHandle {
    /// Creates a new fact handle.
    #[must_use]
    pub const fn new(type_id: TypeId, id: u64) -> Self {
        Self { type_id, id }
    }
}

impl fmt::Debug for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactHandle({}:{})", self.type_id.0, self.id)
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fact({})", self.id)
    }
}

/// A fact handle paired with the version it had when it was indexed.
///
/// The version increments on every update of the fact, allowing detection of
/// references captured before the update.
///
/// # Layout
/// - `handle`: the stable fact handle
/// - `version`: 32-bit update counter
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VersionedHandle {
    /// The stable fact handle.
    pub handle: FactHandle,
    /// Update counter at the time of indexing.
    pub version: u32,
}

impl VersionedHandle {
    /// Creates a versioned handle.
    #[must_use]
    pub const fn new(handle: FactHandle, version: u32) -> Self {
        Self { handle, version }
    }

    /// Returns the handle for the next version of this fact.
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            handle: self.handle,
            version: self.version + 1,
        }
    }
}

impl fmt::Debug for VersionedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FactHandle({}:{}v{})",
            self.handle.type_id.0, self.handle.id, self.version
        )
    }
}
