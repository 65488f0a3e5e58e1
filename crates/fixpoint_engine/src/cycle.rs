//! Fire-cycle controller.
//!
//! One call to `fire` runs rounds until nothing is left to do. Each round:
//! 1. Applies the actions buffered since the previous round
//! 2. Computes deltas of every end node whose storages changed
//! 3. Builds the agenda from rules holding activations
//! 4. Executes rules in agenda order
//! 5. Commits working memory and node stores
//!
//! A failure aborts the round. Its deltas stay uncommitted and its actions
//! are dropped; the next `fire` replays the round from the deltas.

use fixpoint_foundation::Result;
use fixpoint_storage::{ActionBuffer, FactAction, RuntimeMeta, SessionMemory};
use tracing::{debug, trace};

use crate::activation::{ActivationManager, ActivationMode, RuleComparator, RuleInfo};
use crate::executor::TaskExecutor;
use crate::node::EndNode;
use crate::rule::SessionRule;

// =============================================================================
// Cycle State
// =============================================================================

/// Phase of the fire cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CycleState {
    /// Not firing.
    #[default]
    Idle,
    /// Applying actions and computing node deltas.
    DeltaComputing,
    /// Collecting and ordering activations.
    AgendaBuilding,
    /// Running rule actions.
    Executing,
    /// Folding deltas into committed state.
    Committing,
}

// =============================================================================
// Fire Report
// =============================================================================

/// Summary of one `fire` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Rounds run.
    pub rounds: u64,
    /// Activations executed.
    pub activations: usize,
    /// Rule executions, counting a rule once per round it ran.
    pub rules_fired: usize,
    /// Fact actions that took effect.
    pub actions_applied: usize,
}

impl FireReport {
    /// Returns true if no rule ran.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.activations == 0
    }
}

// =============================================================================
// Fire Cycle
// =============================================================================

/// Borrowed view of a session for the duration of one `fire`.
pub(crate) struct FireCycle<'s> {
    pub(crate) meta: &'s RuntimeMeta,
    pub(crate) memory: &'s mut SessionMemory,
    pub(crate) rules: &'s mut [SessionRule],
    pub(crate) executor: &'s TaskExecutor,
    pub(crate) manager: &'s mut dyn ActivationManager,
    pub(crate) comparator: &'s RuleComparator,
    pub(crate) mode: ActivationMode,
    pub(crate) fire_count: &'s mut u64,
    pub(crate) state: CycleState,
}

impl FireCycle<'_> {
    /// Runs rounds until no actions, deltas, or activations remain.
    pub(crate) fn run(mut self, mut actions: Vec<FactAction>) -> Result<FireReport> {
        let mut report = FireReport::default();
        while !actions.is_empty()
            || self.memory.has_delta()
            || self.rules.iter().any(SessionRule::has_activations)
        {
            report.rounds += 1;
            match self.round(actions, &mut report) {
                Ok(next) => actions = next,
                Err(e) => {
                    for rule in self.rules.iter_mut() {
                        rule.abandon_round();
                    }
                    self.enter(CycleState::Idle);
                    return Err(e);
                }
            }
        }
        self.enter(CycleState::Idle);
        debug!(
            rounds = report.rounds,
            activations = report.activations,
            "fire complete"
        );
        Ok(report)
    }

    fn enter(&mut self, state: CycleState) {
        enter(&mut self.state, state);
    }

    fn round(&mut self, actions: Vec<FactAction>, report: &mut FireReport) -> Result<Vec<FactAction>> {
        let round = report.rounds;

        for rule in self.rules.iter_mut() {
            rule.begin_round();
        }

        enter(&mut self.state, CycleState::DeltaComputing);
        report.actions_applied += self.memory.apply(actions, self.meta)?;
        let memory = &*self.memory;
        let affected: Vec<&mut EndNode> = self
            .rules
            .iter_mut()
            .flat_map(SessionRule::end_nodes_mut)
            .filter(|node| node.is_affected(memory))
            .collect();
        let affected_count = affected.len();
        self.executor
            .compute_deltas(affected, memory)
            .map_err(|e| e.in_frame(format!("computing deltas in round {round}")))?;

        enter(&mut self.state, CycleState::AgendaBuilding);
        let mut agenda = Vec::new();
        for (index, rule) in self.rules.iter_mut().enumerate() {
            let pending = rule
                .collect_activations(memory)
                .map_err(|e| e.in_rule(&*rule.info.name, round))?;
            if pending > 0 {
                agenda.push(index);
            }
        }
        let comparator = self.comparator;
        let rules = &*self.rules;
        agenda.sort_by(|&a, &b| comparator(&rules[a].info, &rules[b].info));
        debug!(round, affected = affected_count, agenda = agenda.len(), "round started");

        let mut produced = ActionBuffer::new();
        if !agenda.is_empty() {
            *self.fire_count += 1;
            let infos: Vec<RuleInfo> = agenda.iter().map(|&i| rules[i].info.clone()).collect();
            self.manager.on_agenda(*self.fire_count, &infos);

            enter(&mut self.state, CycleState::Executing);
            for (&index, info) in agenda.iter().zip(&infos) {
                let rule = &mut self.rules[index];
                if !self.manager.test(info) {
                    trace!(rule = %info.name, "rule refused by activation manager");
                    rule.discard_activations();
                    continue;
                }
                let count = rule
                    .execute(memory, self.meta, &mut produced)
                    .map_err(|e| e.in_rule(&*info.name, round))?;
                trace!(rule = %info.name, count, "rule executed");
                report.activations += count;
                report.rules_fired += 1;
                self.manager.on_activation(info, count);
                if self.mode == ActivationMode::Default && !produced.is_empty() {
                    break;
                }
            }
        }

        enter(&mut self.state, CycleState::Committing);
        let vanished = self.memory.commit();
        for rule in self.rules.iter_mut() {
            rule.commit(self.memory, &vanished);
        }
        Ok(produced.take())
    }
}

fn enter(current: &mut CycleState, next: CycleState) {
    trace!(from = ?*current, to = ?next, "cycle phase");
    *current = next;
}
