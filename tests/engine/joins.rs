//! Integration tests for incremental join matching
//!
//! Every match must fire exactly once, whichever rounds its facts arrive in.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use fixpoint_engine::{Knowledge, RuleDescriptor, SessionConfig};
use fixpoint_foundation::{FactHandle, Value};
use fixpoint_storage::{Evaluator, TypeDecl};
use proptest::prelude::*;

type Fired = Arc<Mutex<Vec<Vec<FactHandle>>>>;

fn field(value: &Value, name: &str) -> i64 {
    value.get(name).and_then(Value::as_int).unwrap_or(-1)
}

/// `A(x)`, `B(x, y)`, `C(y)` joined on `x` and `y`, with `C.y != 3`.
fn chain_knowledge(fired: &Fired) -> Knowledge {
    let mut knowledge = Knowledge::with_config(SessionConfig::sequential());
    for name in ["A", "B", "C"] {
        knowledge.declare_type(TypeDecl::new(name));
    }
    let sink = Arc::clone(fired);
    knowledge
        .add_rule(
            RuleDescriptor::new("chain")
                .fact("$a", "A")
                .fact("$b", "B")
                .fact("$c", "C")
                .condition(Evaluator::new([("$a", "x"), ("$b", "x")], |v| v[0] == v[1], 1.0))
                .condition(Evaluator::new([("$b", "y"), ("$c", "y")], |v| v[0] == v[1], 1.0))
                .condition(Evaluator::new([("$c", "y")], |v| v[0] != Value::Int(3), 0.5))
                .action(move |ctx| {
                    let tuple = vec![ctx.handle("$a")?, ctx.handle("$b")?, ctx.handle("$c")?];
                    sink.lock().unwrap().push(tuple);
                    Ok(())
                }),
        )
        .unwrap();
    knowledge
}

#[derive(Clone, Copy, Debug)]
enum Arrival {
    A(i64),
    B(i64, i64),
    C(i64),
}

fn arrival() -> impl Strategy<Value = Arrival> {
    prop_oneof![
        (0..4i64).prop_map(Arrival::A),
        (0..4i64, 0..4i64).prop_map(|(x, y)| Arrival::B(x, y)),
        (0..5i64).prop_map(Arrival::C),
    ]
}

/// Inserts each batch and fires after it; returns the fired tuples and the brute-force matches.
fn run_batches(batches: &[Vec<Arrival>]) -> (Vec<Vec<FactHandle>>, BTreeSet<Vec<FactHandle>>) {
    let fired: Fired = Arc::default();
    let mut session = chain_knowledge(&fired).new_session().unwrap();
    let mut facts: Vec<(&str, FactHandle, Value)> = Vec::new();
    for batch in batches {
        for arrival in batch {
            let (type_name, value) = match *arrival {
                Arrival::A(x) => ("A", Value::record([("x", x)])),
                Arrival::B(x, y) => ("B", Value::record([("x", x), ("y", y)])),
                Arrival::C(y) => ("C", Value::record([("y", y)])),
            };
            let handle = session.insert(type_name, value.clone()).unwrap();
            facts.push((type_name, handle, value));
        }
        session.fire().unwrap();
    }

    let of = |t: &str| -> Vec<(FactHandle, Value)> {
        facts
            .iter()
            .filter(|(name, ..)| *name == t)
            .map(|(_, h, v)| (*h, v.clone()))
            .collect()
    };
    let (sa, sb, sc) = (of("A"), of("B"), of("C"));
    let mut expected = BTreeSet::new();
    for (a, av) in &sa {
        for (b, bv) in &sb {
            for (c, cv) in &sc {
                if field(av, "x") == field(bv, "x")
                    && field(bv, "y") == field(cv, "y")
                    && field(cv, "y") != 3
                {
                    expected.insert(vec![*a, *b, *c]);
                }
            }
        }
    }
    let fired = fired.lock().unwrap().clone();
    (fired, expected)
}

fn sorted(mut tuples: Vec<Vec<FactHandle>>) -> Vec<Vec<FactHandle>> {
    tuples.sort();
    tuples
}

// =============================================================================
// Fixed Scenarios
// =============================================================================

#[test]
fn all_facts_in_one_round() {
    let (fired, expected) = run_batches(&[vec![
        Arrival::A(1),
        Arrival::B(1, 2),
        Arrival::C(2),
        Arrival::C(2),
        Arrival::C(3),
    ]]);
    assert_eq!(fired.len(), 2);
    assert_eq!(sorted(fired), expected.into_iter().collect::<Vec<_>>());
}

#[test]
fn each_source_arriving_in_its_own_round() {
    let (fired, expected) = run_batches(&[
        vec![Arrival::C(2)],
        vec![Arrival::A(1)],
        vec![Arrival::B(1, 2)],
        vec![Arrival::A(1), Arrival::C(2)],
    ]);
    // (A1,B,C1) (A1,B,C2) (A2,B,C1) (A2,B,C2)
    assert_eq!(fired.len(), 4);
    assert_eq!(sorted(fired), expected.into_iter().collect::<Vec<_>>());
}

#[test]
fn two_source_join_sees_known_and_new_keys() {
    let fired: Fired = Arc::default();
    let mut knowledge = Knowledge::with_config(SessionConfig::sequential());
    knowledge.declare_type(TypeDecl::new("Customer"));
    knowledge.declare_type(TypeDecl::new("Order"));
    let sink = Arc::clone(&fired);
    knowledge
        .add_rule(
            RuleDescriptor::new("order-of-customer")
                .fact("$c", "Customer")
                .fact("$o", "Order")
                .condition(Evaluator::new(
                    [("$c", "id"), ("$o", "customer")],
                    |v| v[0] == v[1],
                    1.0,
                ))
                .action(move |ctx| {
                    sink.lock()
                        .unwrap()
                        .push(vec![ctx.handle("$c")?, ctx.handle("$o")?]);
                    Ok(())
                }),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();

    let alice = session.insert("Customer", Value::record([("id", 1)])).unwrap();
    session.fire().unwrap();
    assert!(fired.lock().unwrap().is_empty());

    // Known key on the customer side, new facts on the order side
    let first = session.insert("Order", Value::record([("customer", 1)])).unwrap();
    let second = session.insert("Order", Value::record([("customer", 1)])).unwrap();
    session.insert("Order", Value::record([("customer", 9)]));
    session.fire().unwrap();
    // A second customer under the same key joins the committed orders
    let twin = session.insert("Customer", Value::record([("id", 1)])).unwrap();
    session.fire().unwrap();

    assert_eq!(
        sorted(fired.lock().unwrap().clone()),
        sorted(vec![
            vec![alice, first],
            vec![alice, second],
            vec![twin, first],
            vec![twin, second],
        ])
    );
}

#[test]
fn unconnected_facts_form_a_cross_product() {
    let fired: Fired = Arc::default();
    let mut knowledge = Knowledge::with_config(SessionConfig::sequential());
    knowledge.declare_type(TypeDecl::new("Left"));
    knowledge.declare_type(TypeDecl::new("Right"));
    let sink = Arc::clone(&fired);
    knowledge
        .add_rule(
            RuleDescriptor::new("pairs")
                .fact("$l", "Left")
                .fact("$r", "Right")
                .action(move |ctx| {
                    sink.lock()
                        .unwrap()
                        .push(vec![ctx.handle("$l")?, ctx.handle("$r")?]);
                    Ok(())
                }),
        )
        .unwrap();
    let mut session = knowledge.new_session().unwrap();
    for i in 0..3 {
        session.insert("Left", Value::Int(i));
    }
    session.insert("Right", Value::Int(0));
    session.fire().unwrap();
    session.insert("Right", Value::Int(1));
    session.insert("Left", Value::Int(3));
    session.fire().unwrap();

    let fired = fired.lock().unwrap();
    assert_eq!(fired.len(), 8);
    let unique: BTreeSet<_> = fired.iter().cloned().collect();
    assert_eq!(unique.len(), 8);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_match_fires_exactly_once(
        batches in prop::collection::vec(prop::collection::vec(arrival(), 0..6), 1..5)
    ) {
        let (fired, expected) = run_batches(&batches);
        let unique: BTreeSet<_> = fired.iter().cloned().collect();
        prop_assert_eq!(unique.len(), fired.len());
        prop_assert_eq!(unique, expected);
    }
}
