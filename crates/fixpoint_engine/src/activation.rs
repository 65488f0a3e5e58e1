//! Agenda ordering and activation observers.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Activation Mode
// =============================================================================

/// How a round walks its agenda.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ActivationMode {
    /// Stop after the first rule whose action buffers fact changes, then
    /// recompute the agenda. Rules not reached keep their activations.
    #[default]
    Default,
    /// Run the whole agenda before recomputing.
    Continuous,
}

// =============================================================================
// Rule Info
// =============================================================================

/// Opaque handle of a deployed rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleHandle(pub(crate) u64);

impl fmt::Display for RuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({})", self.0)
    }
}

/// Snapshot of a rule as seen by comparators and activation managers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleInfo {
    /// Handle of the rule.
    pub handle: RuleHandle,
    /// Rule name.
    pub name: Arc<str>,
    /// Explicit salience, if one was set.
    pub salience: Option<i32>,
    /// Declaration sequence number.
    pub sequence: u64,
}

// =============================================================================
// Ordering
// =============================================================================

/// Orders rules on the agenda; `Less` runs first.
pub type RuleComparator = Arc<dyn Fn(&RuleInfo, &RuleInfo) -> Ordering + Send + Sync>;

/// The default agenda order.
///
/// Rules with an explicit salience come first, highest salience first. Rules
/// without one follow. Ties go to the rule declared first.
#[must_use]
pub fn default_rule_order(a: &RuleInfo, b: &RuleInfo) -> Ordering {
    let by_salience = match (a.salience, b.salience) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_salience.then(a.sequence.cmp(&b.sequence))
}

/// Returns [`default_rule_order`] as a comparator.
#[must_use]
pub fn default_comparator() -> RuleComparator {
    Arc::new(default_rule_order)
}

// =============================================================================
// Activation Manager
// =============================================================================

/// Observer and gate for rule execution.
///
/// Every method has a no-op default.
pub trait ActivationManager: Send {
    /// Called once per round with a non-empty agenda, before any rule runs.
    ///
    /// `fire_count` counts such rounds over the session's lifetime.
    fn on_agenda(&mut self, fire_count: u64, agenda: &[RuleInfo]) {
        let _ = (fire_count, agenda);
    }

    /// Decides whether a rule on the agenda runs. A refused rule loses its activations.
    fn test(&mut self, rule: &RuleInfo) -> bool {
        let _ = rule;
        true
    }

    /// Called after a rule ran, with the number of activations it processed.
    fn on_activation(&mut self, rule: &RuleInfo, count: usize) {
        let _ = (rule, count);
    }
}

/// Activation manager that accepts everything and observes nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultActivationManager;

impl ActivationManager for DefaultActivationManager {}
