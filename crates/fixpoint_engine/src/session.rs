//! Knowledge bases and the sessions they create.
//!
//! A [`Knowledge`] collects type declarations and rules. Each [`Session`]
//! branches the knowledge metadata and owns its working memory, so sessions
//! are fully independent of each other and of later changes to the knowledge.

use std::fmt;
use std::sync::Arc;

use fixpoint_foundation::{Error, ErrorKind, FactHandle, Result, TypeId, Value};
use fixpoint_storage::{
    ActionBuffer, Evaluator, EvaluatorHandle, RuntimeMeta, SessionMemory, TypeDecl,
};
use tracing::{debug, instrument, warn};

use crate::activation::{
    ActivationManager, ActivationMode, DefaultActivationManager, RuleComparator, RuleHandle,
    RuleInfo, default_comparator,
};
use crate::config::SessionConfig;
use crate::context::RhsContext;
use crate::cycle::{CycleState, FireCycle, FireReport};
use crate::executor::TaskExecutor;
use crate::rule::{RuleCompiler, RuleDescriptor, SessionRule};

/// Compiles `rule` against a branch of `meta` and returns the deployable rule
/// with the branch that now holds its storages.
fn compile_rule(
    meta: &RuntimeMeta,
    deployed: &[SessionRule],
    rule: RuleDescriptor,
    sequence: u64,
) -> Result<(RuntimeMeta, SessionRule)> {
    if deployed.iter().any(|r| r.info.name == rule.name) {
        return Err(Error::new(ErrorKind::DuplicateRule(rule.name.to_string())));
    }
    let mut branch = meta.branch();
    let lhs = RuleCompiler::compile(&rule, &mut branch)
        .map_err(|e| e.in_frame(format!("compiling rule {}", rule.name)))?;
    let info = RuleInfo {
        handle: RuleHandle(sequence),
        name: rule.name,
        salience: rule.salience,
        sequence,
    };
    Ok((branch, SessionRule::new(info, lhs, rule.actions)))
}

// =============================================================================
// Knowledge
// =============================================================================

/// Type declarations and rules shared by the sessions created from them.
pub struct Knowledge {
    meta: RuntimeMeta,
    rules: Vec<SessionRule>,
    config: SessionConfig,
    next_rule: u64,
}

impl Default for Knowledge {
    fn default() -> Self {
        Self::new()
    }
}

impl Knowledge {
    /// Creates an empty knowledge base with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Creates an empty knowledge base whose sessions use `config`.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            meta: RuntimeMeta::new(),
            rules: Vec::new(),
            config,
            next_rule: 0,
        }
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the metadata context.
    #[must_use]
    pub fn meta(&self) -> &RuntimeMeta {
        &self.meta
    }

    /// Declares a logical type.
    pub fn declare_type(&mut self, decl: TypeDecl) -> TypeId {
        self.meta.declare_type(decl)
    }

    /// Registers an evaluator ahead of the rules that use it.
    pub fn register_evaluator(&mut self, evaluator: &Evaluator) -> EvaluatorHandle {
        self.meta.register_evaluator(evaluator)
    }

    /// Adds a rule to every session created from now on.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DuplicateRule`] if a rule with that name exists,
    /// or any compilation error. A failed rule leaves the knowledge unchanged.
    pub fn add_rule(&mut self, rule: RuleDescriptor) -> Result<RuleHandle> {
        let (meta, compiled) = compile_rule(&self.meta, &self.rules, rule, self.next_rule)?;
        let handle = compiled.info.handle;
        debug!(rule = %compiled.info.name, %handle, "rule added");
        self.meta = meta;
        self.rules.push(compiled);
        self.next_rule += 1;
        Ok(handle)
    }

    /// Iterates over the rules, in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &RuleInfo> + '_ {
        self.rules.iter().map(|r| &r.info)
    }

    /// Creates a session holding every rule added so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the delta worker pool cannot start.
    pub fn new_session(&self) -> Result<Session> {
        let meta = self.meta.branch();
        let memory = SessionMemory::with_capacity(&meta, self.config.initial_capacity)?;
        Ok(Session {
            memory,
            meta,
            rules: self.rules.clone(),
            buffer: ActionBuffer::new(),
            executor: TaskExecutor::new(self.config.parallelism)?,
            manager: Box::new(DefaultActivationManager),
            comparator: default_comparator(),
            mode: self.config.activation_mode,
            fire_count: 0,
            next_rule: self.next_rule,
        })
    }

    /// Creates a one-shot session.
    ///
    /// # Errors
    ///
    /// Returns an error if the delta worker pool cannot start.
    pub fn new_stateless_session(&self) -> Result<StatelessSession> {
        Ok(StatelessSession {
            session: self.new_session()?,
        })
    }
}

impl fmt::Debug for Knowledge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Knowledge")
            .field("types", &self.meta.type_count())
            .field("rules", &self.rules.len())
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Session
// =============================================================================

/// Working memory, deployed rules, and the fire cycle that joins them.
///
/// Inserts, updates, and deletes are buffered and take effect in the first
/// round of the next [`fire`](Self::fire).
pub struct Session {
    meta: RuntimeMeta,
    memory: SessionMemory,
    rules: Vec<SessionRule>,
    buffer: ActionBuffer,
    executor: TaskExecutor,
    manager: Box<dyn ActivationManager>,
    comparator: RuleComparator,
    mode: ActivationMode,
    fire_count: u64,
    next_rule: u64,
}

impl Session {
    /// Buffers a new fact of the named type.
    ///
    /// Returns `None`, and logs a warning, if the type was never declared.
    pub fn insert(&mut self, type_name: &str, value: impl Into<Value>) -> Option<FactHandle> {
        let Some(type_id) = self.meta.type_id(type_name) else {
            warn!(type_name, "insert of undeclared type skipped");
            return None;
        };
        let handle = self.memory.allocate(type_id);
        self.buffer.insert(handle, value.into());
        Some(handle)
    }

    /// Buffers a new value for a fact. Unknown handles are skipped when applied.
    pub fn update(&mut self, handle: FactHandle, value: impl Into<Value>) {
        self.buffer.update(handle, value.into());
    }

    /// Buffers deletion of a fact. Unknown handles are skipped when applied.
    pub fn delete(&mut self, handle: FactHandle) {
        self.buffer.delete(handle);
    }

    /// Runs rounds until no actions, deltas, or activations remain.
    ///
    /// # Errors
    ///
    /// Returns the first condition or action failure, tagged with the rule
    /// and round. Actions buffered by the failing round are dropped; its
    /// fact changes stay applied and are matched again by the next `fire`.
    #[instrument(skip(self), fields(rules = self.rules.len(), facts = self.memory.len()))]
    pub fn fire(&mut self) -> Result<FireReport> {
        let actions = self.buffer.take();
        FireCycle {
            meta: &self.meta,
            memory: &mut self.memory,
            rules: &mut self.rules,
            executor: &self.executor,
            manager: self.manager.as_mut(),
            comparator: &self.comparator,
            mode: self.mode,
            fire_count: &mut self.fire_count,
            state: CycleState::Idle,
        }
        .run(actions)
    }

    /// Returns the value of a committed fact.
    #[must_use]
    pub fn get_fact(&self, handle: FactHandle) -> Option<&Value> {
        self.memory.value(handle)
    }

    /// Iterates over all committed facts.
    pub fn facts(&self) -> impl Iterator<Item = (FactHandle, &Value)> + '_ {
        self.memory.facts()
    }

    /// Iterates over the committed facts of the named type.
    pub fn facts_of<'a>(&'a self, type_name: &str) -> impl Iterator<Item = (FactHandle, &'a Value)> + 'a {
        let memory = &self.memory;
        self.meta
            .type_id(type_name)
            .into_iter()
            .flat_map(move |t| memory.facts_of(t))
    }

    /// Returns the number of committed facts.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.memory.len()
    }

    /// Declares a logical type in this session only.
    ///
    /// # Errors
    ///
    /// Propagates alpha condition failures while reclassifying existing facts.
    pub fn declare_type(&mut self, decl: TypeDecl) -> Result<TypeId> {
        let id = self.meta.declare_type(decl);
        self.memory.refresh(&self.meta)?;
        Ok(id)
    }

    /// Deploys a rule into this session.
    ///
    /// Facts already committed are matched immediately; their activations
    /// fire on the next [`fire`](Self::fire).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DuplicateRule`] for a name already deployed, any
    /// compilation error, or a condition failure while matching existing facts.
    pub fn deploy(&mut self, rule: RuleDescriptor) -> Result<RuleHandle> {
        let (meta, mut compiled) = compile_rule(&self.meta, &self.rules, rule, self.next_rule)?;
        self.memory.refresh(&meta)?;
        self.meta = meta;
        self.next_rule += 1;
        let pending = compiled.activate_all(&self.memory)?;
        let handle = compiled.info.handle;
        debug!(rule = %compiled.info.name, %handle, pending, "rule deployed");
        self.rules.push(compiled);
        Ok(handle)
    }

    /// Removes a rule and its pending activations.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownRule`] if the handle is not deployed.
    pub fn undeploy(&mut self, handle: RuleHandle) -> Result<()> {
        let index = self.rule_index(handle)?;
        let removed = self.rules.remove(index);
        debug!(rule = %removed.info.name, %handle, "rule undeployed");
        Ok(())
    }

    fn rule_index(&self, handle: RuleHandle) -> Result<usize> {
        self.rules
            .iter()
            .position(|r| r.info.handle == handle)
            .ok_or_else(|| Error::new(ErrorKind::UnknownRule(handle.to_string())))
    }

    /// Iterates over deployed rules, in deployment order.
    pub fn rules(&self) -> impl Iterator<Item = &RuleInfo> + '_ {
        self.rules.iter().map(|r| &r.info)
    }

    /// Looks up a deployed rule by name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&RuleInfo> {
        self.rules().find(|r| &*r.name == name)
    }

    /// Changes a rule's salience; `None` removes the explicit salience.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownRule`] if the handle is not deployed.
    pub fn set_salience(&mut self, handle: RuleHandle, salience: Option<i32>) -> Result<()> {
        let index = self.rule_index(handle)?;
        self.rules[index].info.salience = salience;
        Ok(())
    }

    /// Appends an action to a deployed rule.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownRule`] if the handle is not deployed.
    pub fn chain_rhs<F>(&mut self, handle: RuleHandle, action: F) -> Result<()>
    where
        F: Fn(&mut RhsContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let index = self.rule_index(handle)?;
        self.rules[index].chain(Arc::new(action));
        Ok(())
    }

    /// Replaces the activation manager.
    pub fn set_activation_manager(&mut self, manager: impl ActivationManager + 'static) {
        self.manager = Box::new(manager);
    }

    /// Replaces the agenda order; `Less` runs first.
    pub fn set_rule_comparator<F>(&mut self, comparator: F)
    where
        F: Fn(&RuleInfo, &RuleInfo) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        self.comparator = Arc::new(comparator);
    }

    /// Sets how rounds walk their agenda.
    pub fn set_activation_mode(&mut self, mode: ActivationMode) {
        self.mode = mode;
    }

    /// Returns the activation mode.
    #[must_use]
    pub fn activation_mode(&self) -> ActivationMode {
        self.mode
    }

    /// Returns the number of rounds, over the session's lifetime, that had a
    /// non-empty agenda.
    #[must_use]
    pub fn fire_count(&self) -> u64 {
        self.fire_count
    }

    /// Returns the number of activations waiting to fire.
    #[must_use]
    pub fn pending_activations(&self) -> usize {
        self.rules.iter().map(SessionRule::pending_len).sum()
    }

    /// Drops every fact, buffered action, and activation. Rules stay deployed.
    pub fn clear(&mut self) {
        self.memory.clear();
        self.buffer.clear();
        for rule in &mut self.rules {
            rule.clear();
        }
        debug!("session cleared");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("facts", &self.memory.len())
            .field("rules", &self.rules)
            .field("buffered", &self.buffer.len())
            .field("mode", &self.mode)
            .field("fire_count", &self.fire_count)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Stateless Session
// =============================================================================

/// A session used once: insert facts, fire, and take the result.
#[derive(Debug)]
pub struct StatelessSession {
    session: Session,
}

impl StatelessSession {
    /// Buffers a new fact of the named type.
    ///
    /// Returns `None`, and logs a warning, if the type was never declared.
    pub fn insert(&mut self, type_name: &str, value: impl Into<Value>) -> Option<FactHandle> {
        self.session.insert(type_name, value)
    }

    /// Sets how rounds walk their agenda.
    pub fn set_activation_mode(&mut self, mode: ActivationMode) {
        self.session.set_activation_mode(mode);
    }

    /// Fires to completion and returns every remaining fact.
    ///
    /// # Errors
    ///
    /// Returns the first condition or action failure.
    pub fn fire_and_collect(mut self) -> Result<Vec<(FactHandle, Value)>> {
        self.session.fire()?;
        Ok(self
            .session
            .facts()
            .map(|(handle, value)| (handle, value.clone()))
            .collect())
    }
}
