//! Rule descriptors and the per-session state of deployed rules.
//!
//! A [`RuleDescriptor`] names a rule's facts, its conditions, and its actions.
//! The [`RuleCompiler`] turns the descriptor into keyed storages and join
//! trees; a session then owns one `SessionRule` per deployment, holding the
//! trees and the activations still waiting to fire.

pub mod compiler;

pub use compiler::{CompiledLhs, MAX_RULE_FACTS, RuleCompiler};

use std::fmt;
use std::sync::Arc;

use fixpoint_foundation::{CombinationIterator, Result, VersionedHandle};
use fixpoint_storage::{ActionBuffer, Evaluator, RuntimeMeta, SessionMemory, StorageId};

use crate::activation::RuleInfo;
use crate::context::RhsContext;
use crate::node::{EndNode, Leaf, Sources, for_each_combination};

/// A rule action, run once per activation.
pub type RhsAction = Arc<dyn Fn(&mut RhsContext<'_>) -> Result<()> + Send + Sync>;

// =============================================================================
// Rule Descriptor
// =============================================================================

/// A declared rule fact: a binding name and the logical type it matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactDecl {
    /// Binding name, as referenced by conditions and actions.
    pub name: Arc<str>,
    /// Name of the logical type.
    pub type_name: Arc<str>,
}

/// Everything needed to deploy a rule.
///
/// ```
/// use fixpoint_engine::RuleDescriptor;
/// use fixpoint_storage::Evaluator;
///
/// let rule = RuleDescriptor::new("adult")
///     .fact("$p", "Person")
///     .condition(Evaluator::new([("$p", "age")], |v| v[0].as_int() >= Some(18), 1.0))
///     .salience(10)
///     .action(|ctx| {
///         let person = ctx.get("$p")?.clone();
///         ctx.insert("Adult", person);
///         Ok(())
///     });
/// assert_eq!(rule.name(), "adult");
/// ```
#[derive(Clone)]
pub struct RuleDescriptor {
    pub(crate) name: Arc<str>,
    pub(crate) facts: Vec<FactDecl>,
    pub(crate) conditions: Vec<Evaluator>,
    pub(crate) salience: Option<i32>,
    pub(crate) actions: Vec<RhsAction>,
}

impl RuleDescriptor {
    /// Creates a rule with no facts, conditions, or actions.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            facts: Vec::new(),
            conditions: Vec::new(),
            salience: None,
            actions: Vec::new(),
        }
    }

    /// Declares a fact of the named type, bound as `name`.
    #[must_use]
    pub fn fact(mut self, name: impl Into<Arc<str>>, type_name: impl Into<Arc<str>>) -> Self {
        self.facts.push(FactDecl {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn condition(mut self, evaluator: Evaluator) -> Self {
        self.conditions.push(evaluator);
        self
    }

    /// Sets an explicit salience.
    #[must_use]
    pub fn salience(mut self, salience: i32) -> Self {
        self.salience = Some(salience);
        self
    }

    /// Appends an action. Actions run in the order they were added.
    #[must_use]
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut RhsContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.actions.push(Arc::new(action));
        self
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared facts.
    #[must_use]
    pub fn facts(&self) -> &[FactDecl] {
        &self.facts
    }

    /// Returns the conditions, in declaration order.
    #[must_use]
    pub fn conditions(&self) -> &[Evaluator] {
        &self.conditions
    }

    /// Returns the explicit salience, if any.
    #[must_use]
    pub fn salience_value(&self) -> Option<i32> {
        self.salience
    }
}

impl fmt::Debug for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDescriptor")
            .field("name", &self.name)
            .field("facts", &self.facts)
            .field("conditions", &self.conditions.len())
            .field("salience", &self.salience)
            .field("actions", &self.actions.len())
            .finish()
    }
}

// =============================================================================
// Session Rule
// =============================================================================

/// A deployed rule inside one session.
#[derive(Clone)]
pub(crate) struct SessionRule {
    pub(crate) info: RuleInfo,
    names: Arc<[Arc<str>]>,
    end_nodes: Vec<EndNode>,
    /// Flat component index of each rule fact across all end nodes.
    binding_order: Arc<[usize]>,
    actions: Vec<RhsAction>,
    pending: Vec<Arc<[VersionedHandle]>>,
    /// Activations that were already pending before the current round.
    carried: usize,
}

impl SessionRule {
    pub(crate) fn new(info: RuleInfo, lhs: CompiledLhs, actions: Vec<RhsAction>) -> Self {
        let leaves: Vec<Leaf> = lhs
            .end_nodes
            .iter()
            .flat_map(|e| e.leaves().iter().copied())
            .collect();
        let binding_order = (0..lhs.names.len())
            .map(|fact| leaves.iter().position(|l| l.fact == fact).unwrap_or(0))
            .collect();
        Self {
            info,
            names: lhs.names,
            end_nodes: lhs.end_nodes,
            binding_order,
            actions,
            pending: Vec::new(),
            carried: 0,
        }
    }

    pub(crate) fn end_nodes_mut(&mut self) -> impl Iterator<Item = &mut EndNode> + '_ {
        self.end_nodes.iter_mut()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn has_activations(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Marks the activations pending at the start of a round as carried.
    ///
    /// Must run before anything in the round can fail, so that
    /// [`abandon_round`](Self::abandon_round) keeps them.
    pub(crate) fn begin_round(&mut self) {
        self.carried = self.pending.len();
    }

    /// Adds the activations introduced this round and drops stale ones.
    ///
    /// Returns the number of activations now pending.
    pub(crate) fn collect_activations(&mut self, memory: &SessionMemory) -> Result<usize> {
        self.pending
            .retain(|bindings| bindings.iter().all(|f| memory.is_current(f)));
        self.carried = self.pending.len();
        self.enumerate(memory, false)?;
        Ok(self.pending.len())
    }

    /// Forgets the activations found by an aborted round.
    ///
    /// The round's deltas are still uncommitted, so the next round finds
    /// them again.
    pub(crate) fn abandon_round(&mut self) {
        self.pending.truncate(self.carried);
    }

    /// Rebuilds the join trees from committed memory and queues every match.
    pub(crate) fn activate_all(&mut self, memory: &SessionMemory) -> Result<usize> {
        for node in &mut self.end_nodes {
            node.build_full(memory)?;
        }
        self.pending.clear();
        self.enumerate(memory, true)?;
        self.carried = self.pending.len();
        Ok(self.pending.len())
    }

    fn enumerate(&mut self, memory: &SessionMemory, full: bool) -> Result<()> {
        let Self {
            ref end_nodes,
            ref binding_order,
            ref mut pending,
            ..
        } = *self;
        if !full && !end_nodes.iter().any(|e| e.has_delta(memory)) {
            return Ok(());
        }
        let inputs: Vec<Sources<'_>> = end_nodes.iter().map(|e| e.elements(memory)).collect();
        let leaves: Vec<Leaf> = end_nodes
            .iter()
            .flat_map(|e| e.leaves().iter().copied())
            .collect();
        let mut candidates: Vec<Vec<VersionedHandle>> = vec![Vec::new(); leaves.len()];

        for_each_combination(&inputs, full, |combination| {
            let mut component = 0;
            for element in combination {
                for (local, row) in element.rows.iter().enumerate() {
                    let storage = memory.storage(leaves[component].storage);
                    let facts = &mut candidates[component];
                    facts.clear();
                    facts.extend(
                        storage
                            .facts(element.mode(local), row)
                            .iter()
                            .filter(|f| memory.is_current(f))
                            .copied(),
                    );
                    if facts.is_empty() {
                        return Ok(());
                    }
                    component += 1;
                }
            }
            let mut tuples = CombinationIterator::new(candidates.len(), |i| {
                candidates[i].iter().copied()
            });
            while let Some(tuple) = tuples.next_combination() {
                pending.push(binding_order.iter().map(|&i| tuple[i]).collect());
            }
            Ok(())
        })
    }

    /// Runs the actions once per pending activation, in the order they were found.
    ///
    /// Returns the number of activations processed.
    pub(crate) fn execute(
        &mut self,
        memory: &SessionMemory,
        meta: &RuntimeMeta,
        buffer: &mut ActionBuffer,
    ) -> Result<usize> {
        let activations = std::mem::take(&mut self.pending);
        for bindings in &activations {
            let mut ctx = RhsContext::new(
                &self.info.name,
                &self.names,
                bindings,
                memory,
                meta,
                buffer,
            );
            for action in &self.actions {
                action(&mut ctx)?;
            }
        }
        Ok(activations.len())
    }

    pub(crate) fn discard_activations(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn chain(&mut self, action: RhsAction) {
        self.actions.push(action);
    }

    pub(crate) fn commit(&mut self, memory: &SessionMemory, vanished: &[StorageId]) {
        for node in &mut self.end_nodes {
            node.commit(memory, vanished);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.carried = 0;
        for node in &mut self.end_nodes {
            node.clear();
        }
    }
}

impl fmt::Debug for SessionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRule")
            .field("info", &self.info)
            .field("names", &self.names)
            .field("end_nodes", &self.end_nodes.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
