//! Working memory for fixpoint.
//!
//! This crate provides:
//! - [`RuntimeMeta`] - Copy-on-branch metadata: types, active fields, evaluators, alpha buckets
//! - [`AlphaBucket`] - Single-fact condition routing by bitmask
//! - [`KeyedFactStorage`] - Three-region join index (`KnownKnown` / `NewNew` / `KnownNew`)
//! - [`TypeMemory`] / [`SessionMemory`] - Fact records and their keyed storages
//! - [`ActionBuffer`] - Fact actions deferred to the next round

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod action;
pub mod alpha;
pub mod evaluator;
pub mod field;
pub mod key_store;
pub mod memory;
pub mod meta;
pub mod type_memory;

pub use action::{ActionBuffer, FactAction};
pub use alpha::{AlphaBucket, AlphaEvaluator, AlphaTest, compute_bits};
pub use evaluator::{DEFAULT_COMPLEXITY, Evaluator, EvaluatorHandle, Predicate};
pub use field::{Accessor, ActiveField, FieldRef, FieldsKey, TypeDecl, record_accessor};
pub use key_store::{KeyEntry, KeyMode, KeyedFactStorage, ValueRow};
pub use memory::SessionMemory;
pub use meta::{RuntimeMeta, StorageId, TypeMeta};
pub use type_memory::{FactRecord, TypeMemory};
