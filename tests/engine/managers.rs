//! Integration tests for activation managers

use std::sync::{Arc, Mutex};

use fixpoint_engine::{ActivationManager, Knowledge, RuleDescriptor, RuleInfo, SessionConfig};
use fixpoint_foundation::Value;
use fixpoint_storage::TypeDecl;

#[derive(Debug, Default)]
struct Observed {
    agendas: Vec<(u64, Vec<String>)>,
    activations: Vec<(String, usize)>,
}

/// Records every callback and refuses the rules named in `refuse`.
#[derive(Clone, Default)]
struct Recorder {
    observed: Arc<Mutex<Observed>>,
    refuse: Vec<String>,
}

impl ActivationManager for Recorder {
    fn on_agenda(&mut self, fire_count: u64, agenda: &[RuleInfo]) {
        let names = agenda.iter().map(|r| r.name.to_string()).collect();
        self.observed.lock().unwrap().agendas.push((fire_count, names));
    }

    fn test(&mut self, rule: &RuleInfo) -> bool {
        !self.refuse.iter().any(|name| **name == *rule.name)
    }

    fn on_activation(&mut self, rule: &RuleInfo, count: usize) {
        self.observed
            .lock()
            .unwrap()
            .activations
            .push((rule.name.to_string(), count));
    }
}

fn knowledge(ran: &Arc<Mutex<Vec<String>>>) -> Knowledge {
    let mut knowledge = Knowledge::with_config(SessionConfig::sequential());
    knowledge.declare_type(TypeDecl::new("Job"));
    for (name, salience) in [("allowed", 2), ("blocked", 1)] {
        let sink = Arc::clone(ran);
        knowledge
            .add_rule(
                RuleDescriptor::new(name)
                    .fact("$j", "Job")
                    .salience(salience)
                    .action(move |ctx| {
                        sink.lock().unwrap().push(ctx.rule_name().to_string());
                        Ok(())
                    }),
            )
            .unwrap();
    }
    knowledge
}

#[test]
fn manager_sees_agenda_and_counts() {
    let ran = Arc::default();
    let mut session = knowledge(&ran).new_session().unwrap();
    let recorder = Recorder::default();
    session.set_activation_manager(recorder.clone());
    for _ in 0..3 {
        session.insert("Job", Value::Nil);
    }
    session.fire().unwrap();

    let observed = recorder.observed.lock().unwrap();
    assert_eq!(
        observed.agendas,
        vec![(1, vec!["allowed".to_string(), "blocked".to_string()])]
    );
    assert_eq!(
        observed.activations,
        vec![("allowed".to_string(), 3), ("blocked".to_string(), 3)]
    );
}

#[test]
fn refused_rules_lose_their_activations() {
    let ran: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut session = knowledge(&ran).new_session().unwrap();
    let recorder = Recorder {
        refuse: vec!["blocked".to_string()],
        ..Recorder::default()
    };
    session.set_activation_manager(recorder.clone());
    session.insert("Job", Value::Nil);
    let report = session.fire().unwrap();

    assert_eq!(*ran.lock().unwrap(), ["allowed"]);
    assert_eq!(report.rules_fired, 1);
    assert_eq!(session.pending_activations(), 0);
    assert_eq!(recorder.observed.lock().unwrap().activations.len(), 1);

    // Accepting again does not bring the refused activation back
    session.set_activation_manager(Recorder::default());
    assert!(session.fire().unwrap().is_quiet());
    assert_eq!(ran.lock().unwrap().len(), 1);
}

#[test]
fn fire_count_spans_fires() {
    let ran = Arc::default();
    let mut session = knowledge(&ran).new_session().unwrap();
    let recorder = Recorder::default();
    session.set_activation_manager(recorder.clone());
    session.insert("Job", Value::Nil);
    session.fire().unwrap();
    session.fire().unwrap();
    session.insert("Job", Value::Nil);
    session.fire().unwrap();

    let counts: Vec<u64> = recorder
        .observed
        .lock()
        .unwrap()
        .agendas
        .iter()
        .map(|(count, _)| *count)
        .collect();
    assert_eq!(counts, [1, 2]);
    assert_eq!(session.fire_count(), 2);
}
