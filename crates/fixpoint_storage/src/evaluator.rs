//! Condition evaluators.
//!
//! An evaluator is an opaque predicate over the values of a list of fact
//! fields, plus a complexity score used to order cheap tests first.

use std::fmt;
use std::sync::Arc;

use fixpoint_foundation::{Result, Value};

use crate::field::FieldRef;

/// Predicate over field values, in the order of the evaluator's fields.
pub type Predicate = Arc<dyn Fn(&[Value]) -> Result<bool> + Send + Sync>;

/// Default complexity assigned to conditions.
pub const DEFAULT_COMPLEXITY: f64 = 1.0;

/// A rule condition: a predicate and the fact fields it reads.
///
/// Cloning an evaluator shares its predicate. Clones used by several rules
/// register once and share alpha classification.
#[derive(Clone)]
pub struct Evaluator {
    fields: Arc<[FieldRef]>,
    predicate: Predicate,
    complexity: f64,
}

impl Evaluator {
    /// Creates an evaluator from an infallible predicate.
    ///
    /// `fields` lists `(fact, field)` pairs; the predicate receives their
    /// values in the same order.
    pub fn new<I, S, T, F>(fields: I, predicate: F, complexity: f64) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<Arc<str>>,
        T: Into<Arc<str>>,
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        Self::fallible(fields, move |values: &[Value]| Ok(predicate(values)), complexity)
    }

    /// Creates an evaluator whose predicate may fail.
    ///
    /// A failure aborts the fire cycle that evaluated it.
    pub fn fallible<I, S, T, F>(fields: I, predicate: F, complexity: f64) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<Arc<str>>,
        T: Into<Arc<str>>,
        F: Fn(&[Value]) -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(fact, field)| FieldRef::new(fact, field))
                .collect(),
            predicate: Arc::new(predicate),
            complexity,
        }
    }

    /// Returns the fields this evaluator reads.
    #[must_use]
    pub fn fields(&self) -> &[FieldRef] {
        &self.fields
    }

    /// Returns the declared complexity.
    #[must_use]
    pub const fn complexity(&self) -> f64 {
        self.complexity
    }

    /// Returns the distinct fact names referenced, in first-use order.
    #[must_use]
    pub fn facts(&self) -> Vec<Arc<str>> {
        let mut facts: Vec<Arc<str>> = Vec::new();
        for field in self.fields.iter() {
            if !facts.contains(&field.fact) {
                facts.push(field.fact.clone());
            }
        }
        facts
    }

    /// Evaluates the predicate.
    ///
    /// # Errors
    ///
    /// Returns whatever error the predicate produces.
    pub fn evaluate(&self, values: &[Value]) -> Result<bool> {
        (self.predicate)(values)
    }

    /// Returns true if both evaluators share one predicate.
    #[must_use]
    pub fn same_predicate(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.predicate, &other.predicate)
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("fields", &self.fields)
            .field("complexity", &self.complexity)
            .finish_non_exhaustive()
    }
}

/// Registry index of an evaluator within a metadata context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvaluatorHandle(pub(crate) usize);

impl EvaluatorHandle {
    /// Returns the raw registry index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}
