//! Failing conditions and actions: error context and replay on the next fire

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use fixpoint::engine::{Knowledge, RuleDescriptor, SessionConfig};
use fixpoint::foundation::{Error, ErrorKind, Value};
use fixpoint::storage::{Evaluator, TypeDecl};

use crate::init_tracing;

fn knowledge() -> Knowledge {
    let mut knowledge = Knowledge::with_config(SessionConfig::sequential());
    knowledge.declare_type(TypeDecl::new("Left"));
    knowledge.declare_type(TypeDecl::new("Right"));
    knowledge
}

fn keyed(k: i64) -> Value {
    Value::record([("k", k)])
}

#[test]
fn action_failure_names_rule_and_round() {
    init_tracing();
    let mut knowledge = knowledge();
    knowledge
        .add_rule(
            RuleDescriptor::new("explode")
                .fact("$l", "Left")
                .action(|_| Err(Error::evaluation("no fuel"))),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert("Left", keyed(1));
    let err = session.fire().unwrap_err();

    let context = err.context.as_ref().unwrap();
    assert_eq!(context.rule.as_deref(), Some("explode"));
    assert_eq!(context.round, Some(1));
    assert!(context.to_string().starts_with("in rule explode (round 1)"));
}

#[test]
fn failed_action_is_replayed_by_the_next_fire() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut knowledge = knowledge();
    let counter = Arc::clone(&attempts);
    knowledge
        .add_rule(
            RuleDescriptor::new("flaky")
                .fact("$l", "Left")
                .action(move |ctx| {
                    if counter.fetch_add(1, Ordering::Relaxed) == 0 {
                        return Err(Error::evaluation("first attempt fails"));
                    }
                    ctx.insert("Right", keyed(0));
                    Ok(())
                }),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert("Left", keyed(1));

    assert!(session.fire().is_err());
    assert_eq!(session.facts_of("Right").count(), 0);
    // The inserted fact stayed applied and its match comes back exactly once
    assert_eq!(session.fact_count(), 1);
    session.fire().unwrap();
    assert_eq!(attempts.load(Ordering::Relaxed), 2);
    assert_eq!(session.facts_of("Right").count(), 1);
    assert!(session.fire().unwrap().is_quiet());
}

#[test]
fn failing_join_condition_aborts_and_recovers() {
    let broken = Arc::new(AtomicBool::new(true));
    let hits = Arc::new(AtomicUsize::new(0));
    let mut knowledge = knowledge();
    let flag = Arc::clone(&broken);
    let sink = Arc::clone(&hits);
    knowledge
        .add_rule(
            RuleDescriptor::new("pair")
                .fact("$l", "Left")
                .fact("$r", "Right")
                .condition(Evaluator::fallible(
                    [("$l", "k"), ("$r", "k")],
                    move |v| {
                        if flag.load(Ordering::Relaxed) {
                            Err(Error::evaluation("comparator offline"))
                        } else {
                            Ok(v[0] == v[1])
                        }
                    },
                    1.0,
                ))
                .action(move |_| {
                    sink.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert("Left", keyed(1));
    session.insert("Right", keyed(1));

    let err = session.fire().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Evaluation { .. }));
    let stack = &err.context.as_ref().unwrap().stack;
    assert!(stack.iter().any(|frame| frame.contains("computing deltas")));

    broken.store(false, Ordering::Relaxed);
    session.fire().unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}

#[test]
fn activations_carried_into_a_failed_round_survive() {
    let broken = Arc::new(AtomicBool::new(true));
    let audits = Arc::new(AtomicUsize::new(0));
    let mut knowledge = knowledge();
    knowledge
        .add_rule(
            RuleDescriptor::new("spawn")
                .salience(10)
                .fact("$l", "Left")
                .action(|ctx| {
                    ctx.insert("Right", keyed(1));
                    Ok(())
                }),
        )
        .unwrap();
    let sink = Arc::clone(&audits);
    knowledge
        .add_rule(
            RuleDescriptor::new("audit")
                .salience(1)
                .fact("$l", "Left")
                .action(move |_| {
                    sink.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }),
        )
        .unwrap();
    let flag = Arc::clone(&broken);
    knowledge
        .add_rule(
            RuleDescriptor::new("pair")
                .fact("$l", "Left")
                .fact("$r", "Right")
                .condition(Evaluator::fallible(
                    [("$l", "k"), ("$r", "k")],
                    move |v| {
                        if flag.swap(false, Ordering::Relaxed) {
                            Err(Error::evaluation("comparator offline"))
                        } else {
                            Ok(v[0] == v[1])
                        }
                    },
                    1.0,
                )),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert("Left", keyed(1));

    // Round 1 runs `spawn` and stops; `audit` is still pending when
    // round 2 fails computing the join over the new Right fact.
    assert!(session.fire().is_err());
    assert_eq!(audits.load(Ordering::Relaxed), 0);
    assert_eq!(session.pending_activations(), 1);

    session.fire().unwrap();
    assert_eq!(audits.load(Ordering::Relaxed), 1);
    assert_eq!(session.facts_of("Right").count(), 1);
}

#[test]
fn missing_binding_in_an_action_is_an_error() {
    let mut knowledge = knowledge();
    knowledge
        .add_rule(
            RuleDescriptor::new("typo")
                .fact("$l", "Left")
                .action(|ctx| ctx.get("$left").map(|_| ())),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    session.insert("Left", keyed(1));
    let err = session.fire().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownBinding(ref name) if name == "$left"));
}

#[test]
fn updates_to_deleted_facts_are_skipped() {
    let mut session = knowledge().new_session().unwrap();
    let fact = session.insert("Left", keyed(1)).unwrap();
    session.fire().unwrap();
    session.delete(fact);
    session.update(fact, keyed(2));
    let report = session.fire().unwrap();
    assert_eq!(report.actions_applied, 1);
    assert!(session.get_fact(fact).is_none());
}
