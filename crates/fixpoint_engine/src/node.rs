//! Beta network: join nodes over keyed fact storages.
//!
//! A rule's facts form one or more connected groups. Each group compiles to a
//! tree whose leaves read keyed storages of working memory and whose inner
//! [`ConditionNode`]s join their sources on multi-fact conditions. The root of
//! each group is wrapped in an [`EndNode`].
//!
//! Every node result is a [`KeyTuple`]: the concatenation of one value row per
//! leaf. Condition nodes keep their results in the same three regions as the
//! keyed storages, so a parent node (or the rule) can read only what is new.
//!
//! # Delta enumeration
//!
//! For `n` sources, every non-zero mask over `n` bits selects, per source,
//! either its delta elements (bit set) or its `KnownKnown` elements (bit
//! clear). The cross product of each mask's selections yields exactly the
//! combinations containing at least one new element, each once.

use std::fmt;
use std::sync::Arc;

use fixpoint_foundation::{CombinationIterator, LinearHash, Result, Value, hash_of};
use fixpoint_storage::{Evaluator, KeyMode, KeyedFactStorage, SessionMemory, StorageId, ValueRow};

// =============================================================================
// Leaves and Elements
// =============================================================================

/// A rule fact as read by the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Leaf {
    /// Position of the fact among the rule's declared facts.
    pub fact: usize,
    /// Keyed storage holding the fact's candidates.
    pub storage: StorageId,
}

/// Key modes of the components of one element.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Modes<'a> {
    /// Every component comes from the same region.
    Uniform(KeyMode),
    /// One mode per component.
    Each(&'a [KeyMode]),
}

impl Modes<'_> {
    fn get(self, component: usize) -> KeyMode {
        match self {
            Self::Uniform(mode) => mode,
            Self::Each(modes) => modes[component],
        }
    }
}

/// One candidate produced by a node: a row per leaf and the region each row's
/// facts are taken from.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Element<'a> {
    pub(crate) rows: &'a [ValueRow],
    modes: Modes<'a>,
}

impl Element<'_> {
    /// Returns the region holding the facts of one component.
    pub(crate) fn mode(&self, component: usize) -> KeyMode {
        self.modes.get(component)
    }
}

/// Elements of one source, split by what a mask bit selects.
#[derive(Debug, Default)]
pub(crate) struct Sources<'a> {
    main: Vec<Element<'a>>,
    delta: Vec<Element<'a>>,
}

fn storage_elements<'a>(storage: &'a KeyedFactStorage, modes: &[KeyMode]) -> Vec<Element<'a>> {
    modes
        .iter()
        .flat_map(|&mode| {
            storage.keys(mode).map(move |entry| Element {
                rows: std::slice::from_ref(&entry.row),
                modes: Modes::Uniform(mode),
            })
        })
        .collect()
}

/// Visits the combinations of `sources` selected by the mask scheme.
///
/// With `full` set only the all-`KnownKnown` mask is visited; otherwise every
/// non-zero mask is, least significant bit first.
///
/// # Panics
///
/// Panics if there are more than 63 sources.
pub(crate) fn for_each_combination<'a>(
    sources: &[Sources<'a>],
    full: bool,
    mut visit: impl FnMut(&[Element<'a>]) -> Result<()>,
) -> Result<()> {
    let n = sources.len();
    assert!(n < 64, "too many join sources: {n}");
    let masks = if full { 0..1u64 } else { 1..(1u64 << n) };
    for mask in masks {
        let selected = |i: usize| {
            if mask & (1u64 << i) == 0 {
                &sources[i].main
            } else {
                &sources[i].delta
            }
        };
        if (0..n).any(|i| selected(i).is_empty()) {
            continue;
        }
        let mut combinations = CombinationIterator::new(n, |i| selected(i).iter().copied());
        while let Some(combination) = combinations.next_combination() {
            visit(combination)?;
        }
    }
    Ok(())
}

// =============================================================================
// Key Tuples
// =============================================================================

/// A join result: one value row per leaf, with a cached hash.
#[derive(Clone)]
pub struct KeyTuple {
    rows: Arc<[ValueRow]>,
    hash: u64,
}

impl KeyTuple {
    fn new(rows: Arc<[ValueRow]>) -> Self {
        let codes: Vec<u64> = rows.iter().map(ValueRow::hash_code).collect();
        Self {
            hash: hash_of(codes.as_slice()),
            rows,
        }
    }

    /// Returns the rows, in leaf order.
    #[must_use]
    pub fn rows(&self) -> &[ValueRow] {
        &self.rows
    }
}

impl PartialEq for KeyTuple {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.rows == other.rows
    }
}

impl Eq for KeyTuple {}

impl fmt::Debug for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rows.iter()).finish()
    }
}

/// A tuple produced this round and the component modes it was reached with.
#[derive(Clone, Debug)]
struct DeltaTuple {
    tuple: KeyTuple,
    modes: Vec<Arc<[KeyMode]>>,
}

/// Three-region store of a condition node's results.
#[derive(Clone, Debug, Default)]
struct NodeStore {
    known: LinearHash<KeyTuple>,
    new_new: LinearHash<DeltaTuple>,
    known_new: LinearHash<DeltaTuple>,
}

impl NodeStore {
    fn insert_delta(&mut self, tuple: KeyTuple, modes: Arc<[KeyMode]>) {
        let hash = tuple.hash;
        let region = if self.known.contains(hash, |t| *t == tuple) {
            &mut self.known_new
        } else {
            &mut self.new_new
        };
        region
            .compute_if_absent(
                hash,
                |d| d.tuple == tuple,
                || DeltaTuple {
                    tuple: tuple.clone(),
                    modes: Vec::new(),
                },
            )
            .modes
            .push(modes);
    }

    fn insert_known(&mut self, tuple: KeyTuple) {
        self.known.add_silent(tuple.hash, tuple, |a, b| a == b);
    }

    fn commit(&mut self) {
        for region in [&mut self.new_new, &mut self.known_new] {
            for delta in region.drain() {
                self.known
                    .add_silent(delta.tuple.hash, delta.tuple, |a, b| a == b);
            }
        }
    }

    fn clear_delta(&mut self) {
        self.new_new.clear();
        self.known_new.clear();
    }

    fn clear(&mut self) {
        self.known.clear();
        self.clear_delta();
    }

    fn elements(&self, delta: bool) -> Vec<Element<'_>> {
        if !delta {
            return self
                .known
                .iter()
                .map(|t| Element {
                    rows: &t.rows,
                    modes: Modes::Uniform(KeyMode::KnownKnown),
                })
                .collect();
        }
        self.new_new
            .iter()
            .chain(self.known_new.iter())
            .flat_map(|d| {
                d.modes.iter().map(move |modes| Element {
                    rows: &d.tuple.rows,
                    modes: Modes::Each(modes),
                })
            })
            .collect()
    }
}

// =============================================================================
// Condition Node
// =============================================================================

/// A multi-fact condition bound to node components.
#[derive(Clone, Debug)]
pub struct NodeCondition {
    evaluator: Evaluator,
    /// `(component, position in that component's row)` per predicate argument.
    args: Vec<(usize, usize)>,
}

impl NodeCondition {
    /// Binds an evaluator to component positions.
    #[must_use]
    pub fn new(evaluator: Evaluator, args: Vec<(usize, usize)>) -> Self {
        Self { evaluator, args }
    }
}

/// Inner node joining two or more sources.
#[derive(Clone, Debug)]
pub struct ConditionNode {
    sources: Vec<BetaNode>,
    conditions: Vec<NodeCondition>,
    leaves: Vec<Leaf>,
    locate: Vec<(usize, usize)>,
    store: NodeStore,
}

impl ConditionNode {
    /// Creates a node over `sources`.
    ///
    /// Condition arguments address components of the concatenated leaves of
    /// the sources, in source order. Conditions run cheapest first.
    #[must_use]
    pub fn new(sources: Vec<BetaNode>, mut conditions: Vec<NodeCondition>) -> Self {
        conditions.sort_by(|a, b| {
            a.evaluator
                .complexity()
                .total_cmp(&b.evaluator.complexity())
        });
        let mut leaves = Vec::new();
        let mut locate = Vec::new();
        for (s, source) in sources.iter().enumerate() {
            for (k, leaf) in source.leaves().iter().enumerate() {
                leaves.push(*leaf);
                locate.push((s, k));
            }
        }
        Self {
            sources,
            conditions,
            leaves,
            locate,
            store: NodeStore::default(),
        }
    }

    /// Returns the number of committed tuples.
    #[must_use]
    pub fn known_len(&self) -> usize {
        self.store.known.len()
    }

    /// Returns the number of tuples produced this round.
    #[must_use]
    pub fn delta_len(&self) -> usize {
        self.store.new_new.len() + self.store.known_new.len()
    }

    fn passes(
        conditions: &[NodeCondition],
        locate: &[(usize, usize)],
        combination: &[Element<'_>],
        args: &mut Vec<Value>,
    ) -> Result<bool> {
        for condition in conditions {
            args.clear();
            args.extend(condition.args.iter().map(|&(component, position)| {
                let (source, local) = locate[component];
                combination[source].rows[local].values()[position].clone()
            }));
            if !condition.evaluator.evaluate(args)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn join(combination: &[Element<'_>]) -> (KeyTuple, Arc<[KeyMode]>) {
        let mut rows = Vec::new();
        let mut modes = Vec::new();
        for element in combination {
            for (component, row) in element.rows.iter().enumerate() {
                rows.push(row.clone());
                modes.push(element.mode(component));
            }
        }
        (KeyTuple::new(rows.into()), modes.into())
    }

    fn compute_delta(&mut self, memory: &SessionMemory) -> Result<()> {
        self.store.clear_delta();
        if !self
            .leaves
            .iter()
            .any(|l| memory.storage(l.storage).has_delta())
        {
            return Ok(());
        }
        for source in &mut self.sources {
            source.compute_delta(memory)?;
        }

        let Self {
            ref sources,
            ref conditions,
            ref locate,
            ref mut store,
            ..
        } = *self;
        let inputs: Vec<Sources<'_>> = sources.iter().map(|s| s.elements(memory)).collect();
        let mut args = Vec::new();
        for_each_combination(&inputs, false, |combination| {
            if Self::passes(conditions, locate, combination, &mut args)? {
                let (tuple, modes) = Self::join(combination);
                store.insert_delta(tuple, modes);
            }
            Ok(())
        })
    }

    fn build_full(&mut self, memory: &SessionMemory) -> Result<()> {
        self.store.clear();
        for source in &mut self.sources {
            source.build_full(memory)?;
        }

        let Self {
            ref sources,
            ref conditions,
            ref locate,
            ref mut store,
            ..
        } = *self;
        let inputs: Vec<Sources<'_>> = sources.iter().map(|s| s.elements(memory)).collect();
        let mut args = Vec::new();
        for_each_combination(&inputs, true, |combination| {
            if Self::passes(conditions, locate, combination, &mut args)? {
                store.insert_known(Self::join(combination).0);
            }
            Ok(())
        })
    }

    fn commit(&mut self, memory: &SessionMemory, vanished: &[StorageId]) {
        for source in &mut self.sources {
            source.commit(memory, vanished);
        }
        self.store.commit();
        if self.leaves.iter().any(|l| vanished.contains(&l.storage)) {
            let leaves = &self.leaves;
            self.store.known.delete_where(|tuple| {
                !tuple.rows.iter().zip(leaves).all(|(row, leaf)| {
                    memory
                        .storage(leaf.storage)
                        .contains_key(KeyMode::KnownKnown, row)
                })
            });
        }
    }

    fn clear(&mut self) {
        self.store.clear();
        for source in &mut self.sources {
            source.clear();
        }
    }
}

// =============================================================================
// Beta Node
// =============================================================================

/// A node of a rule's join tree.
#[derive(Clone, Debug)]
pub enum BetaNode {
    /// Leaf reading one keyed storage.
    Entry(Leaf),
    /// Join of two or more sources.
    Condition(ConditionNode),
}

impl BetaNode {
    /// Returns the leaves under this node, in component order.
    #[must_use]
    pub fn leaves(&self) -> &[Leaf] {
        match self {
            Self::Entry(leaf) => std::slice::from_ref(leaf),
            Self::Condition(node) => &node.leaves,
        }
    }

    /// Returns true if any storage under this node has delta content.
    #[must_use]
    pub fn has_delta_input(&self, memory: &SessionMemory) -> bool {
        self.leaves()
            .iter()
            .any(|l| memory.storage(l.storage).has_delta())
    }

    /// Returns true if this node holds results that are new this round.
    ///
    /// Reads only region sizes, so it is cheap enough to run for every rule.
    #[must_use]
    pub fn has_delta_output(&self, memory: &SessionMemory) -> bool {
        match self {
            Self::Entry(leaf) => memory.storage(leaf.storage).has_delta(),
            Self::Condition(node) => node.delta_len() > 0,
        }
    }

    /// Computes this round's results bottom-up.
    ///
    /// # Errors
    ///
    /// Propagates the first condition failure. Results computed before it
    /// are kept.
    pub fn compute_delta(&mut self, memory: &SessionMemory) -> Result<()> {
        match self {
            Self::Entry(_) => Ok(()),
            Self::Condition(node) => node.compute_delta(memory).map_err(|e| {
                e.in_frame(format!("condition node over {} facts", node.leaves.len()))
            }),
        }
    }

    /// Rebuilds committed results from the committed content of working memory.
    ///
    /// # Errors
    ///
    /// Propagates the first condition failure.
    pub fn build_full(&mut self, memory: &SessionMemory) -> Result<()> {
        match self {
            Self::Entry(_) => Ok(()),
            Self::Condition(node) => node.build_full(memory),
        }
    }

    /// Folds this round's results into `KnownKnown`.
    ///
    /// Results referencing a key that vanished from one of `vanished` are dropped.
    pub fn commit(&mut self, memory: &SessionMemory, vanished: &[StorageId]) {
        if let Self::Condition(node) = self {
            node.commit(memory, vanished);
        }
    }

    /// Drops all results.
    pub fn clear(&mut self) {
        if let Self::Condition(node) = self {
            node.clear();
        }
    }

    pub(crate) fn elements<'a>(&'a self, memory: &'a SessionMemory) -> Sources<'a> {
        match self {
            Self::Entry(leaf) => {
                let storage = memory.storage(leaf.storage);
                Sources {
                    main: storage_elements(storage, &[KeyMode::KnownKnown]),
                    delta: storage_elements(storage, &KeyMode::DELTA),
                }
            }
            Self::Condition(node) => Sources {
                main: node.store.elements(false),
                delta: node.store.elements(true),
            },
        }
    }
}

// =============================================================================
// End Node
// =============================================================================

/// Root of one connected group of rule facts.
#[derive(Clone, Debug)]
pub struct EndNode {
    node: BetaNode,
}

impl EndNode {
    /// Wraps a group root.
    #[must_use]
    pub fn new(node: BetaNode) -> Self {
        Self { node }
    }

    /// Returns the wrapped node.
    #[must_use]
    pub fn node(&self) -> &BetaNode {
        &self.node
    }

    /// Returns the group's leaves, in component order.
    #[must_use]
    pub fn leaves(&self) -> &[Leaf] {
        self.node.leaves()
    }

    /// Returns true if this round touched any storage of the group.
    #[must_use]
    pub fn is_affected(&self, memory: &SessionMemory) -> bool {
        self.node.has_delta_input(memory)
    }

    /// Returns true if the group produced new results this round.
    #[must_use]
    pub fn has_delta(&self, memory: &SessionMemory) -> bool {
        self.node.has_delta_output(memory)
    }

    /// Computes this round's results for the group.
    ///
    /// # Errors
    ///
    /// Propagates the first condition failure.
    pub fn compute_delta(&mut self, memory: &SessionMemory) -> Result<()> {
        self.node.compute_delta(memory)
    }

    /// Rebuilds committed results for the group.
    ///
    /// # Errors
    ///
    /// Propagates the first condition failure.
    pub fn build_full(&mut self, memory: &SessionMemory) -> Result<()> {
        self.node.build_full(memory)
    }

    /// Ends the round for the group.
    pub fn commit(&mut self, memory: &SessionMemory, vanished: &[StorageId]) {
        self.node.commit(memory, vanished);
    }

    /// Drops all results.
    pub fn clear(&mut self) {
        self.node.clear();
    }

    pub(crate) fn elements<'a>(&'a self, memory: &'a SessionMemory) -> Sources<'a> {
        self.node.elements(memory)
    }
}
