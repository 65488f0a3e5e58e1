//! Core values, fact handles, errors, and hash collections for fixpoint.
//!
//! This crate provides:
//! - [`Value`] - The dynamic value type held by facts and extracted from fields
//! - [`FactHandle`] / [`VersionedHandle`] - Stable fact identifiers with update versions
//! - [`Error`] - Rich error types with context
//! - [`LinearHash`] / [`LinearMap`] - Open-addressing hash table with tombstone deletion
//! - [`CombinationIterator`] - Allocation-free N-ary cross product
//! - [`Bits`] - Growable bitmask for alpha classification

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bits;
pub mod combination;
pub mod error;
pub mod handle;
pub mod hash;
pub mod value;

pub use bits::Bits;
pub use combination::CombinationIterator;
pub use error::{Error, ErrorContext, ErrorKind};
pub use handle::{FactHandle, TypeId, VersionedHandle};
pub use hash::{Cursor, LinearHash, LinearMap, hash_of};
pub use value::Value;

/// Result type alias using fixpoint's Error.
pub type Result<T> = std::result::Result<T, Error>;
