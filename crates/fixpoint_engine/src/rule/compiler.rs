//! Rule compiler - turns descriptors into keyed storages and join trees.
//!
//! Compilation registers everything a rule needs in the metadata context:
//! evaluators, active fields, alpha bits, buckets, and one keyed storage per
//! rule fact. Single-fact conditions become alpha tests; multi-fact conditions
//! become joins. Facts connected by joins end up under one [`EndNode`].

use std::sync::Arc;

use fixpoint_foundation::{Error, ErrorKind, Result, TypeId};
use fixpoint_storage::{AlphaTest, Evaluator, FieldsKey, RuntimeMeta, TypeMeta};

use crate::node::{BetaNode, ConditionNode, EndNode, Leaf, NodeCondition};
use crate::rule::RuleDescriptor;

/// Largest number of facts one rule may declare.
pub const MAX_RULE_FACTS: usize = 32;

// =============================================================================
// Compiled LHS
// =============================================================================

/// The matching side of a compiled rule.
#[derive(Clone, Debug)]
pub struct CompiledLhs {
    /// Fact binding names, in declaration order.
    pub names: Arc<[Arc<str>]>,
    /// One end node per connected group of facts.
    pub end_nodes: Vec<EndNode>,
}

/// A multi-fact condition waiting to be placed in a join tree.
struct BetaCondition {
    evaluator: Evaluator,
    /// Distinct facts read, ascending.
    facts: Vec<usize>,
    /// `(fact, active field index)` per predicate argument.
    args: Vec<(usize, usize)>,
}

// =============================================================================
// Rule Compiler
// =============================================================================

/// Compiles rule descriptors against a metadata context.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Compiles a rule, registering its storages in `meta`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownType`] for an undeclared fact type,
    /// [`ErrorKind::DuplicateBinding`] for a repeated fact name,
    /// [`ErrorKind::UnknownBinding`] for a condition naming an undeclared fact,
    /// and [`ErrorKind::InvalidRule`] for a rule with no facts or more than
    /// [`MAX_RULE_FACTS`].
    pub fn compile(rule: &RuleDescriptor, meta: &mut RuntimeMeta) -> Result<CompiledLhs> {
        let facts = Self::resolve_facts(rule, meta)?;
        let mut alpha: Vec<Vec<AlphaTest>> = vec![Vec::new(); facts.len()];
        let mut key_fields: Vec<Vec<usize>> = vec![Vec::new(); facts.len()];
        let mut beta = Vec::new();

        for evaluator in &rule.conditions {
            let handle = meta.register_evaluator(evaluator);
            let mut args = Vec::with_capacity(evaluator.fields().len());
            for field in evaluator.fields() {
                let fact = facts
                    .iter()
                    .position(|(name, _)| *name == field.fact)
                    .ok_or_else(|| Error::new(ErrorKind::UnknownBinding(field.fact.to_string())))?;
                let index = Self::type_meta(meta, facts[fact].1)?.activate_field(&field.field);
                args.push((fact, index));
            }

            let mut involved: Vec<usize> = args.iter().map(|a| a.0).collect();
            involved.sort_unstable();
            involved.dedup();
            if involved.len() > 1 {
                for &(fact, index) in &args {
                    key_fields[fact].push(index);
                }
                beta.push(BetaCondition {
                    evaluator: evaluator.clone(),
                    facts: involved,
                    args,
                });
            } else {
                // Conditions reading no field are attached to the first fact
                let fact = involved.first().copied().unwrap_or(0);
                let fields = args.iter().map(|a| a.1).collect();
                let bit = Self::type_meta(meta, facts[fact].1)?.register_alpha(handle, fields, evaluator);
                alpha[fact].push(AlphaTest::new(bit, true));
            }
        }

        let mut leaves = Vec::with_capacity(facts.len());
        let mut keys = Vec::with_capacity(facts.len());
        for (fact, (_, type_id)) in facts.iter().enumerate() {
            let type_meta = Self::type_meta(meta, *type_id)?;
            let bucket = type_meta.register_bucket(std::mem::take(&mut alpha[fact]));
            let key = type_meta.fields_key(std::mem::take(&mut key_fields[fact]));
            let storage = type_meta.register_storage(key.id, bucket);
            leaves.push(Leaf { fact, storage });
            keys.push(key);
        }

        Ok(CompiledLhs {
            names: facts.into_iter().map(|(name, _)| name).collect(),
            end_nodes: Self::build_groups(leaves, &keys, beta)?,
        })
    }

    fn resolve_facts(rule: &RuleDescriptor, meta: &RuntimeMeta) -> Result<Vec<(Arc<str>, TypeId)>> {
        if rule.facts.is_empty() {
            return Err(Error::new(ErrorKind::InvalidRule(format!(
                "rule {} declares no facts",
                rule.name
            ))));
        }
        if rule.facts.len() > MAX_RULE_FACTS {
            return Err(Error::new(ErrorKind::InvalidRule(format!(
                "rule {} declares {} facts; at most {MAX_RULE_FACTS} are supported",
                rule.name,
                rule.facts.len()
            ))));
        }
        let mut facts: Vec<(Arc<str>, TypeId)> = Vec::with_capacity(rule.facts.len());
        for decl in &rule.facts {
            if facts.iter().any(|(name, _)| *name == decl.name) {
                return Err(Error::new(ErrorKind::DuplicateBinding(decl.name.to_string())));
            }
            facts.push((decl.name.clone(), meta.resolve(&decl.type_name)?));
        }
        Ok(facts)
    }

    fn type_meta(meta: &mut RuntimeMeta, type_id: TypeId) -> Result<&mut TypeMeta> {
        meta.type_meta_mut(type_id)
            .ok_or_else(|| Error::internal(format!("no metadata for {type_id:?}")))
    }

    /// Folds leaves into join trees, one per connected group.
    ///
    /// Conditions over fewer facts are placed first, then cheaper ones. Each
    /// condition merges the groups it spans; any pending condition whose facts
    /// all lie in the merged group is evaluated by the same node.
    fn build_groups(
        leaves: Vec<Leaf>,
        keys: &[FieldsKey],
        mut pending: Vec<BetaCondition>,
    ) -> Result<Vec<EndNode>> {
        pending.sort_by(|a, b| {
            a.facts.len().cmp(&b.facts.len()).then(
                a.evaluator
                    .complexity()
                    .total_cmp(&b.evaluator.complexity()),
            )
        });
        let mut groups: Vec<Option<BetaNode>> =
            leaves.into_iter().map(|l| Some(BetaNode::Entry(l))).collect();
        // Group slot owning each fact; a slot is the smallest fact index it holds
        let mut owner: Vec<usize> = (0..groups.len()).collect();

        while !pending.is_empty() {
            let condition = pending.remove(0);
            let mut roots: Vec<usize> = condition.facts.iter().map(|&f| owner[f]).collect();
            roots.sort_unstable();
            roots.dedup();
            if roots.len() < 2 {
                return Err(Error::internal("join condition left over after its group was built"));
            }

            let mut sources = Vec::with_capacity(roots.len());
            for &root in &roots {
                sources.push(
                    groups[root]
                        .take()
                        .ok_or_else(|| Error::internal(format!("group {root} already consumed")))?,
                );
            }
            let merged: Vec<Leaf> = sources
                .iter()
                .flat_map(|s| s.leaves().iter().copied())
                .collect();

            let mut absorbed = vec![condition];
            let mut i = 0;
            while i < pending.len() {
                if pending[i]
                    .facts
                    .iter()
                    .all(|f| merged.iter().any(|l| l.fact == *f))
                {
                    absorbed.push(pending.remove(i));
                } else {
                    i += 1;
                }
            }
            let conditions = absorbed
                .into_iter()
                .map(|c| Self::bind(c, &merged, keys))
                .collect::<Result<Vec<_>>>()?;

            let slot = roots[0];
            for leaf in &merged {
                owner[leaf.fact] = slot;
            }
            groups[slot] = Some(BetaNode::Condition(ConditionNode::new(sources, conditions)));
        }

        Ok(groups.into_iter().flatten().map(EndNode::new).collect())
    }

    fn bind(condition: BetaCondition, leaves: &[Leaf], keys: &[FieldsKey]) -> Result<NodeCondition> {
        let args = condition
            .args
            .iter()
            .map(|&(fact, index)| {
                let component = leaves
                    .iter()
                    .position(|l| l.fact == fact)
                    .ok_or_else(|| Error::internal(format!("fact {fact} is not under the join")))?;
                let position = keys[fact]
                    .position(index)
                    .ok_or_else(|| Error::internal(format!("field {index} is not keyed for fact {fact}")))?;
                Ok((component, position))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(NodeCondition::new(condition.evaluator, args))
    }
}
