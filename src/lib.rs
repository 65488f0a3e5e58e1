//! Fixpoint - Forward-chaining RETE inference engine
//!
//! This crate re-exports all layers of the fixpoint system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: fixpoint_engine    : Beta network, fire cycle, knowledge and sessions
//! Layer 1: fixpoint_storage   : Type metadata, alpha buckets, keyed fact storage
//! Layer 0: fixpoint_foundation: Core types (Value, FactHandle, Error, LinearHash)
//! ```
//!
//! # Example
//!
//! ```
//! use fixpoint::engine::{Knowledge, RuleDescriptor};
//! use fixpoint::foundation::Value;
//! use fixpoint::storage::{Evaluator, TypeDecl};
//!
//! let mut knowledge = Knowledge::new();
//! knowledge.declare_type(TypeDecl::new("Temperature"));
//! knowledge.declare_type(TypeDecl::new("Alert"));
//! knowledge
//!     .add_rule(
//!         RuleDescriptor::new("too-hot")
//!             .fact("$t", "Temperature")
//!             .condition(Evaluator::new([("$t", "celsius")], |v| v[0].as_int() > Some(30), 1.0))
//!             .action(|ctx| {
//!                 let reading = ctx.get("$t")?.clone();
//!                 ctx.insert("Alert", reading);
//!                 Ok(())
//!             }),
//!     )
//!     .unwrap();
//!
//! let mut session = knowledge.new_session().unwrap();
//! session.insert("Temperature", Value::record([("celsius", 35)]));
//! session.insert("Temperature", Value::record([("celsius", 20)]));
//! session.fire().unwrap();
//! assert_eq!(session.facts_of("Alert").count(), 1);
//! ```

pub use fixpoint_engine as engine;
pub use fixpoint_foundation as foundation;
pub use fixpoint_storage as storage;
