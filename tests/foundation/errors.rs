//! Integration tests for error kinds and context

use fixpoint_foundation::{Error, ErrorContext, ErrorKind, FactHandle, TypeId};

#[test]
fn messages_name_the_subject() {
    assert_eq!(Error::unknown_type("Order").to_string(), "unknown type: Order");
    let missing = Error::fact_not_found(FactHandle::new(TypeId::new(0), 4));
    assert!(missing.to_string().contains("fact not found"));
    assert!(
        Error::action("r", "bad input")
            .to_string()
            .contains("action of rule r failed")
    );
}

#[test]
fn context_accumulates_frames_then_rule() {
    let err = Error::evaluation("division by zero")
        .in_frame("condition node over 2 facts")
        .in_frame("computing deltas in round 3")
        .in_rule("pricing", 3);
    let context = err.context.as_ref().unwrap();
    assert_eq!(context.rule.as_deref(), Some("pricing"));
    assert_eq!(context.round, Some(3));
    assert_eq!(context.stack.len(), 2);

    let shown = context.to_string();
    assert!(shown.starts_with("in rule pricing (round 3)"));
    assert!(shown.contains("  in condition node over 2 facts"));
}

#[test]
fn explicit_context_replaces_existing() {
    let err = Error::internal("x")
        .in_frame("first")
        .with_context(ErrorContext::new().with_frame("second"));
    assert_eq!(err.context.unwrap().stack, vec!["second".to_string()]);
    assert!(matches!(Error::internal("x").kind, ErrorKind::Internal(_)));
}
