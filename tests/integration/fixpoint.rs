//! Rule sets that chain into each other until nothing is left to derive

use std::collections::BTreeSet;

use fixpoint::engine::{ActivationMode, Knowledge, RuleDescriptor, SessionConfig};
use fixpoint::foundation::Value;
use fixpoint::storage::{Evaluator, TypeDecl};

use crate::init_tracing;

fn int(value: &Value, field: &str) -> i64 {
    value.get(field).and_then(Value::as_int).unwrap_or(-1)
}

fn edge(from: i64, to: i64) -> Value {
    Value::record([("from", from), ("to", to)])
}

/// Transitive closure: `Edge` seeds `Path`, and `Path` extends along `Edge`.
fn closure_knowledge(mode: ActivationMode) -> Knowledge {
    let mut knowledge =
        Knowledge::with_config(SessionConfig::default().with_activation_mode(mode));
    knowledge.declare_type(TypeDecl::new("Edge"));
    knowledge.declare_type(TypeDecl::new("Path"));
    knowledge
        .add_rule(
            RuleDescriptor::new("seed")
                .fact("$e", "Edge")
                .action(|ctx| {
                    let e = ctx.get("$e")?.clone();
                    ctx.insert("Path", e);
                    Ok(())
                }),
        )
        .unwrap();
    knowledge
        .add_rule(
            RuleDescriptor::new("extend")
                .fact("$p", "Path")
                .fact("$e", "Edge")
                .condition(Evaluator::new(
                    [("$p", "to"), ("$e", "from")],
                    |v| v[0] == v[1],
                    1.0,
                ))
                .action(|ctx| {
                    let from = int(ctx.get("$p")?, "from");
                    let to = int(ctx.get("$e")?, "to");
                    let known = ctx
                        .facts_of("Path")
                        .any(|(_, p)| int(p, "from") == from && int(p, "to") == to);
                    if !known {
                        ctx.insert("Path", edge(from, to));
                    }
                    Ok(())
                }),
        )
        .unwrap();
    knowledge
}

fn paths(session: &fixpoint::engine::Session) -> BTreeSet<(i64, i64)> {
    session
        .facts_of("Path")
        .map(|(_, p)| (int(p, "from"), int(p, "to")))
        .collect()
}

#[test]
fn closure_of_a_chain() {
    init_tracing();
    for mode in [ActivationMode::Default, ActivationMode::Continuous] {
        let mut session = closure_knowledge(mode).new_session().unwrap();
        for i in 0..4 {
            session.insert("Edge", edge(i, i + 1));
        }
        let report = session.fire().unwrap();

        let expected: BTreeSet<_> = (0..5)
            .flat_map(|a| (a + 1..5).map(move |b| (a, b)))
            .collect();
        assert_eq!(paths(&session), expected, "mode {mode:?}");
        assert!(report.rounds > 1);
        assert!(session.fire().unwrap().is_quiet());
    }
}

#[test]
fn closure_of_a_cycle_terminates() {
    init_tracing();
    let mut session = closure_knowledge(ActivationMode::Continuous)
        .new_session()
        .unwrap();
    for i in 0..3 {
        session.insert("Edge", edge(i, (i + 1) % 3));
    }
    session.fire().unwrap();

    let expected: BTreeSet<_> = (0..3).flat_map(|a| (0..3).map(move |b| (a, b))).collect();
    assert_eq!(paths(&session), expected);
    assert_eq!(session.pending_activations(), 0);
}

#[test]
fn closure_grows_incrementally() {
    let mut session = closure_knowledge(ActivationMode::Default)
        .new_session()
        .unwrap();
    session.insert("Edge", edge(0, 1));
    session.insert("Edge", edge(2, 3));
    session.fire().unwrap();
    assert_eq!(paths(&session).len(), 2);

    session.insert("Edge", edge(1, 2));
    session.fire().unwrap();
    assert_eq!(
        paths(&session),
        BTreeSet::from([(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)])
    );
}

#[test]
fn alpha_filters_and_joins_combine() {
    let mut knowledge = Knowledge::with_config(SessionConfig::sequential());
    knowledge.declare_type(TypeDecl::new("Sensor"));
    knowledge.declare_type(TypeDecl::new("Reading"));
    knowledge.declare_type(TypeDecl::new("Alert"));
    knowledge
        .add_rule(
            RuleDescriptor::new("overheat")
                .fact("$s", "Sensor")
                .fact("$r", "Reading")
                .condition(Evaluator::new(
                    [("$s", "id"), ("$r", "sensor")],
                    |v| v[0] == v[1],
                    1.0,
                ))
                .condition(Evaluator::new(
                    [("$s", "limit"), ("$r", "celsius")],
                    |v| v[1].as_int() > v[0].as_int(),
                    2.0,
                ))
                .condition(Evaluator::new(
                    [("$s", "active")],
                    |v| v[0] == Value::Bool(true),
                    0.5,
                ))
                .action(|ctx| {
                    let reading = ctx.get("$r")?.clone();
                    ctx.insert("Alert", reading);
                    Ok(())
                }),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    let sensor = |id: i64, limit: i64, active: bool| {
        Value::record([
            ("id", Value::from(id)),
            ("limit", Value::from(limit)),
            ("active", Value::from(active)),
        ])
    };
    let reading = |sensor: i64, celsius: i64| {
        Value::record([("sensor", sensor), ("celsius", celsius)])
    };
    session.insert("Sensor", sensor(1, 50, true));
    session.insert("Sensor", sensor(2, 50, false));
    session.insert("Reading", reading(1, 70));
    session.insert("Reading", reading(1, 40));
    session.insert("Reading", reading(2, 90));
    session.fire().unwrap();

    let alerts: Vec<Value> = session.facts_of("Alert").map(|(_, v)| v.clone()).collect();
    assert_eq!(alerts, vec![reading(1, 70)]);
}
