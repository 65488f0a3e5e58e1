//! Error types for the fixpoint engine.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::handle::FactHandle;

/// The main error type for fixpoint operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Pushes a frame onto this error's context, creating the context if needed.
    #[must_use]
    pub fn in_frame(mut self, frame: impl Into<String>) -> Self {
        let context = self.context.take().unwrap_or_default();
        self.context = Some(context.with_frame(frame));
        self
    }

    /// Records the rule and fire-cycle round the error surfaced in.
    ///
    /// Frames already on the context are kept.
    #[must_use]
    pub fn in_rule(mut self, rule: impl Into<String>, round: u64) -> Self {
        let context = self.context.take().unwrap_or_default();
        self.context = Some(context.with_rule(rule).with_round(round));
        self
    }

    /// Creates an unknown logical type error.
    #[must_use]
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownType(name.into()))
    }

    /// Creates an unknown field error.
    #[must_use]
    pub fn unknown_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownField {
            type_name: type_name.into(),
            field: field.into(),
        })
    }

    /// Creates a fact not found error.
    #[must_use]
    pub fn fact_not_found(handle: FactHandle) -> Self {
        Self::new(ErrorKind::FactNotFound(handle))
    }

    /// Creates a condition evaluation failure.
    #[must_use]
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation {
            message: message.into(),
        })
    }

    /// Creates a rule action failure.
    #[must_use]
    pub fn action(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Action {
            rule: rule.into(),
            message: message.into(),
        })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A logical type name was never declared.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A field was referenced that the type cannot provide.
    #[error("unknown field: {field} on type {type_name}")]
    UnknownField {
        /// The type that was queried.
        type_name: String,
        /// The field name that was not found.
        field: String,
    },

    /// A rule name or handle does not refer to a deployed rule.
    #[error("unknown rule: {0}")]
    UnknownRule(String),

    /// A rule action referenced a fact name the rule does not declare.
    #[error("unknown fact binding: {0}")]
    UnknownBinding(String),

    /// A rule declared the same fact name twice.
    #[error("duplicate fact binding: {0}")]
    DuplicateBinding(String),

    /// A rule descriptor cannot be compiled.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A rule with the same name is already deployed.
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    /// Fact was not found in working memory.
    #[error("fact not found: {0:?}")]
    FactNotFound(FactHandle),

    /// A user-supplied condition failed to evaluate.
    #[error("condition evaluation failed: {message}")]
    Evaluation {
        /// Description of the failure.
        message: String,
    },

    /// A user-supplied rule action failed.
    #[error("action of rule {rule} failed: {message}")]
    Action {
        /// Name of the rule whose action failed.
        rule: String,
        /// Description of the failure.
        message: String,
    },

    /// A hash table was asked to exceed its maximum capacity.
    #[error("capacity exceeded: {requested} slots requested")]
    CapacityExceeded {
        /// The number of slots that was requested.
        requested: usize,
    },

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Rule that was executing, if any.
    pub rule: Option<String>,
    /// Fire-cycle round in which the error surfaced.
    pub round: Option<u64>,
    /// Stack of engine frames (node, phase) the error passed through.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule name.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Sets the fire-cycle round.
    #[must_use]
    pub fn with_round(mut self, round: u64) -> Self {
        self.round = Some(round);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "in rule {rule}")?;
        }
        if let Some(round) = self.round {
            write!(f, " (round {round})")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
