//! Beta network, fire cycle, and sessions for fixpoint.
//!
//! This crate provides:
//! - [`RuleDescriptor`] / [`RuleCompiler`] - Rule declaration and compilation into join trees
//! - [`BetaNode`] / [`EndNode`] - Incremental delta joins over keyed fact storages
//! - [`ActivationManager`] - Agenda observation and gating
//! - [`TaskExecutor`] - Parallel per-round delta computation
//! - [`Knowledge`] / [`Session`] / [`StatelessSession`] - The public entry points

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod activation;
pub mod config;
pub mod context;
pub mod cycle;
pub mod executor;
pub mod node;
pub mod rule;
pub mod session;

pub use activation::{
    ActivationManager, ActivationMode, DefaultActivationManager, RuleComparator, RuleHandle,
    RuleInfo, default_comparator, default_rule_order,
};
pub use config::SessionConfig;
pub use context::RhsContext;
pub use cycle::{CycleState, FireReport};
pub use executor::TaskExecutor;
pub use node::{BetaNode, ConditionNode, EndNode, KeyTuple, Leaf, NodeCondition};
pub use rule::{CompiledLhs, FactDecl, MAX_RULE_FACTS, RhsAction, RuleCompiler, RuleDescriptor};
pub use session::{Knowledge, Session, StatelessSession};
