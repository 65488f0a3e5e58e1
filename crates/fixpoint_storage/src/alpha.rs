//! Alpha classification: single-fact conditions as bitmasks.
//!
//! Each single-fact condition registered against a type gets one bit. A fact's
//! bitmask is computed once when its field values change, and every join that
//! depends on the type routes facts with an [`AlphaBucket`] test on that mask
//! instead of re-running conditions.

use std::sync::Arc;

use fixpoint_foundation::{Bits, Result, Value};

use crate::evaluator::{Evaluator, EvaluatorHandle};

/// A single-fact condition bound to active fields of one type.
#[derive(Clone, Debug)]
pub struct AlphaEvaluator {
    /// Bit position in a fact's alpha mask.
    pub bit: usize,
    /// Registry handle of the underlying evaluator.
    pub handle: EvaluatorHandle,
    /// Active field indices passed to the predicate, in argument order.
    pub fields: Arc<[usize]>,
    evaluator: Evaluator,
}

impl AlphaEvaluator {
    pub(crate) fn new(
        bit: usize,
        handle: EvaluatorHandle,
        fields: Arc<[usize]>,
        evaluator: Evaluator,
    ) -> Self {
        Self {
            bit,
            handle,
            fields,
            evaluator,
        }
    }

    /// Returns the declared complexity.
    #[must_use]
    pub const fn complexity(&self) -> f64 {
        self.evaluator.complexity()
    }

    /// Evaluates this condition against a fact's field values.
    ///
    /// # Errors
    ///
    /// Propagates predicate failures.
    pub fn test(&self, field_values: &[Value]) -> Result<bool> {
        let args: Vec<Value> = self
            .fields
            .iter()
            .map(|&i| field_values.get(i).cloned().unwrap_or(Value::Nil))
            .collect();
        self.evaluator.evaluate(&args)
    }
}

/// Computes the alpha mask of a fact from its field values.
///
/// # Errors
///
/// Propagates the first predicate failure.
pub fn compute_bits<'a>(
    evaluators: impl IntoIterator<Item = &'a AlphaEvaluator>,
    field_values: &[Value],
) -> Result<Bits> {
    let mut bits = Bits::new();
    for evaluator in evaluators {
        if evaluator.test(field_values)? {
            bits.set(evaluator.bit, true);
        }
    }
    Ok(bits)
}

/// One required `(bit, expected outcome)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlphaTest {
    /// Bit position of the evaluator.
    pub bit: usize,
    /// Required value of that bit.
    pub expected: bool,
}

impl AlphaTest {
    /// Creates a test.
    #[must_use]
    pub const fn new(bit: usize, expected: bool) -> Self {
        Self { bit, expected }
    }

    fn passes(self, bits: &Bits) -> bool {
        bits.get(self.bit) == self.expected
    }
}

/// A deduplicated combination of alpha tests required by some join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlphaBucket {
    /// No alpha conditions; every fact passes.
    Empty,
    /// Exactly one condition.
    Single(AlphaTest),
    /// Several conditions, cheapest first.
    Multi(Arc<[AlphaTest]>),
}

impl AlphaBucket {
    /// Builds a bucket from tests paired with their evaluator complexity.
    ///
    /// Duplicate tests are dropped. Multi-bit buckets keep ascending
    /// complexity order (ties by bit) so cheap tests fail fast.
    #[must_use]
    pub fn from_tests(mut tests: Vec<(AlphaTest, f64)>) -> Self {
        tests.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        let mut unique: Vec<AlphaTest> = Vec::with_capacity(tests.len());
        for (test, _) in tests {
            if !unique.contains(&test) {
                unique.push(test);
            }
        }
        match unique.as_slice() {
            [] => Self::Empty,
            [single] => Self::Single(*single),
            _ => Self::Multi(unique.into()),
        }
    }

    /// Returns true if a fact with mask `bits` belongs to this bucket.
    #[must_use]
    pub fn test(&self, bits: &Bits) -> bool {
        match self {
            Self::Empty => true,
            Self::Single(test) => test.passes(bits),
            Self::Multi(tests) => tests.iter().all(|t| t.passes(bits)),
        }
    }

    /// Returns the bucket's tests ordered by bit, used as its identity.
    #[must_use]
    pub fn identity(&self) -> Vec<AlphaTest> {
        let mut tests = match self {
            Self::Empty => Vec::new(),
            Self::Single(test) => vec![*test],
            Self::Multi(tests) => tests.to_vec(),
        };
        tests.sort_unstable();
        tests
    }
}
