//! Rules deployed into and removed from live sessions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fixpoint::engine::{Knowledge, RuleDescriptor, SessionConfig};
use fixpoint::foundation::{Error, ErrorKind, Value};
use fixpoint::storage::{Evaluator, TypeDecl};

use crate::init_tracing;

fn knowledge() -> Knowledge {
    let mut knowledge = Knowledge::with_config(SessionConfig::sequential());
    knowledge.declare_type(TypeDecl::new("Task"));
    knowledge.declare_type(TypeDecl::new("Worker"));
    knowledge
}

/// Counts every (worker, task) pair sharing a skill.
fn matcher(name: &str, hits: &Arc<AtomicUsize>) -> RuleDescriptor {
    let hits = Arc::clone(hits);
    RuleDescriptor::new(name)
        .fact("$w", "Worker")
        .fact("$t", "Task")
        .condition(Evaluator::new(
            [("$w", "skill"), ("$t", "skill")],
            |v| v[0] == v[1],
            1.0,
        ))
        .action(move |_| {
            hits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
}

fn skilled(skill: &str) -> Value {
    Value::record([("skill", skill)])
}

#[test]
fn deployed_rule_matches_committed_and_buffered_facts() {
    init_tracing();
    let hits = Arc::new(AtomicUsize::new(0));
    let mut session = knowledge().new_session().unwrap();
    session.insert("Worker", skilled("weld"));
    session.insert("Task", skilled("weld"));
    session.insert("Task", skilled("paint"));
    session.fire().unwrap();

    // Buffered before deployment, applied by the next fire
    session.insert("Task", skilled("weld"));
    session.deploy(matcher("match", &hits)).unwrap();
    assert_eq!(session.pending_activations(), 1);

    session.fire().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 2);
    session.insert("Worker", skilled("paint"));
    session.fire().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 3);
}

#[test]
fn deployment_is_local_to_one_session() {
    let hits = Arc::new(AtomicUsize::new(0));
    let knowledge = knowledge();
    let mut first = knowledge.new_session().unwrap();
    let mut second = knowledge.new_session().unwrap();
    first.deploy(matcher("match", &hits)).unwrap();

    for session in [&mut first, &mut second] {
        session.insert("Worker", skilled("weld"));
        session.insert("Task", skilled("weld"));
        session.fire().unwrap();
    }
    assert_eq!(hits.load(Ordering::Relaxed), 1);
    assert_eq!(knowledge.rules().count(), 0);
    assert!(second.rule("match").is_none());
}

#[test]
fn undeployed_rule_stops_matching() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut knowledge = knowledge();
    let handle = knowledge.add_rule(matcher("match", &hits)).unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert("Worker", skilled("weld"));
    session.insert("Task", skilled("weld"));
    session.undeploy(handle).unwrap();
    session.fire().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 0);

    // Redeploying under the same name is allowed once the old rule is gone
    session.deploy(matcher("match", &hits)).unwrap();
    session.fire().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}

#[test]
fn session_types_can_back_new_rules() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut session = knowledge().new_session().unwrap();
    let err = session
        .deploy(
            RuleDescriptor::new("shifts")
                .fact("$s", "Shift")
                .fact("$w", "Worker"),
        )
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownType(_)));

    session.declare_type(TypeDecl::new("Shift")).unwrap();
    let sink = Arc::clone(&hits);
    session
        .deploy(
            RuleDescriptor::new("shifts")
                .fact("$s", "Shift")
                .fact("$w", "Worker")
                .action(move |_| {
                    sink.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
        )
        .unwrap();
    session.insert("Shift", Value::Nil);
    session.insert("Worker", skilled("weld"));
    session.insert("Worker", skilled("paint"));
    session.fire().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 2);
}

#[test]
fn rejected_descriptors_report_why() {
    let mut knowledge = knowledge();
    let empty = knowledge.add_rule(RuleDescriptor::new("empty")).unwrap_err();
    assert!(matches!(empty.kind, ErrorKind::InvalidRule(_)));

    let twice = knowledge
        .add_rule(
            RuleDescriptor::new("twice")
                .fact("$t", "Task")
                .fact("$t", "Worker"),
        )
        .unwrap_err();
    assert!(matches!(twice.kind, ErrorKind::DuplicateBinding(_)));

    let dangling = knowledge
        .add_rule(
            RuleDescriptor::new("dangling")
                .fact("$t", "Task")
                .condition(Evaluator::new([("$x", "skill")], |_| true, 1.0)),
        )
        .unwrap_err();
    assert!(matches!(dangling.kind, ErrorKind::UnknownBinding(_)));
    assert_eq!(knowledge.rules().count(), 0);
}

#[test]
fn failed_deployment_leaves_memory_consistent() {
    let mut session = knowledge().new_session().unwrap();
    for (x, y) in [(1, 2), (-1, 3), (5, 7)] {
        session.insert("Task", Value::record([("x", x), ("y", y)]));
    }
    session.fire().unwrap();

    let err = session
        .deploy(
            RuleDescriptor::new("strict").fact("$t", "Task").condition(Evaluator::fallible(
                [("$t", "x")],
                |v| match v[0].as_int() {
                    Some(x) if x >= 0 => Ok(true),
                    _ => Err(Error::evaluation("negative x")),
                },
                1.0,
            )),
        )
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Evaluation { .. }));
    assert!(session.rule("strict").is_none());

    // The next rule reads `y` where the failed one would have read `x`
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    session
        .deploy(
            RuleDescriptor::new("positive")
                .fact("$t", "Task")
                .condition(Evaluator::new(
                    [("$t", "y")],
                    |v| v[0].as_int() > Some(0),
                    1.0,
                ))
                .action(move |_| {
                    sink.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
        )
        .unwrap();
    session.fire().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 3);
}
