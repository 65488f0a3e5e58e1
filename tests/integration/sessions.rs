//! Session lifecycles: independence, clearing, and stateless use

use fixpoint::engine::{ActivationMode, Knowledge, RuleDescriptor, SessionConfig};
use fixpoint::foundation::Value;
use fixpoint::storage::{Evaluator, TypeDecl};

use crate::init_tracing;

/// Every `Order` over 100 gets a matching `Discount`.
fn discounts() -> Knowledge {
    let mut knowledge = Knowledge::with_config(SessionConfig::default().with_parallelism(2));
    knowledge.declare_type(TypeDecl::new("Order"));
    knowledge.declare_type(TypeDecl::new("Discount"));
    knowledge
        .add_rule(
            RuleDescriptor::new("discount")
                .fact("$o", "Order")
                .condition(Evaluator::new(
                    [("$o", "total")],
                    |v| v[0].as_int() > Some(100),
                    1.0,
                ))
                .action(|ctx| {
                    let order = ctx.handle("$o")?;
                    ctx.insert("Discount", Value::record([("order", order.id.to_string())]));
                    Ok(())
                }),
        )
        .unwrap();
    knowledge
}

fn order(total: i64) -> Value {
    Value::record([("total", total)])
}

#[test]
fn sessions_share_rules_but_not_facts() {
    init_tracing();
    let knowledge = discounts();
    let mut first = knowledge.new_session().unwrap();
    let mut second = knowledge.new_session().unwrap();
    first.insert("Order", order(150));
    first.fire().unwrap();
    second.fire().unwrap();

    assert_eq!(first.facts_of("Discount").count(), 1);
    assert_eq!(second.fact_count(), 0);
}

#[test]
fn cleared_session_starts_over_with_the_same_rules() {
    let mut session = discounts().new_session().unwrap();
    session.insert("Order", order(500));
    session.fire().unwrap();
    assert_eq!(session.fact_count(), 2);

    session.clear();
    assert_eq!(session.fact_count(), 0);
    assert_eq!(session.pending_activations(), 0);

    let again = session.insert("Order", order(101)).unwrap();
    session.fire().unwrap();
    let discounts: Vec<_> = session.facts_of("Discount").collect();
    assert_eq!(discounts.len(), 1);
    assert_eq!(
        discounts[0].1.get("order"),
        Some(&Value::from(again.id.to_string()))
    );
}

#[test]
fn stateless_session_returns_every_fact() {
    let mut stateless = discounts().new_stateless_session().unwrap();
    stateless.set_activation_mode(ActivationMode::Continuous);
    for total in [50, 150, 250] {
        stateless.insert("Order", order(total));
    }
    let facts = stateless.fire_and_collect().unwrap();
    assert_eq!(facts.len(), 5);
    let discounts = facts
        .iter()
        .filter(|(_, v)| v.get("order").is_some())
        .count();
    assert_eq!(discounts, 2);
}

#[test]
fn many_facts_through_the_worker_pool() {
    let mut knowledge = Knowledge::with_config(SessionConfig::batch().with_parallelism(4));
    for name in ["A", "B", "Hit"] {
        knowledge.declare_type(TypeDecl::new(name));
    }
    for i in 0..6 {
        knowledge
            .add_rule(
                RuleDescriptor::new(format!("join-{i}"))
                    .fact("$a", "A")
                    .fact("$b", "B")
                    .condition(Evaluator::new(
                        [("$a", "k"), ("$b", "k")],
                        |v| v[0] == v[1],
                        1.0,
                    ))
                    .condition(Evaluator::new(
                        [("$a", "n")],
                        move |v| v[0].as_int().is_some_and(|n| n % 6 == i),
                        1.0,
                    ))
                    .action(|ctx| {
                        ctx.insert("Hit", Value::Nil);
                        Ok(())
                    }),
            )
            .unwrap();
    }
    let mut session = knowledge.new_session().unwrap();
    for n in 0..60i64 {
        session.insert("A", Value::record([("k", n % 10), ("n", n)]));
    }
    for k in 0..10i64 {
        session.insert("B", Value::record([("k", k)]));
    }
    let report = session.fire().unwrap();

    assert_eq!(report.activations, 60);
    assert_eq!(session.facts_of("Hit").count(), 60);
}
