//! Logical type declarations, active fields and fields keys.
//!
//! A field becomes *active* the first time some rule condition references it.
//! Only active fields are extracted from inserted facts.

use std::fmt;
use std::sync::Arc;

use fixpoint_foundation::{TypeId, Value};

/// Extracts one field value from a fact value.
pub type Accessor = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Returns an accessor reading `name` from a [`Value::Record`].
///
/// Missing fields and non-record facts read as [`Value::Nil`].
#[must_use]
pub fn record_accessor(name: Arc<str>) -> Accessor {
    Arc::new(move |fact: &Value| fact.get(&name).cloned().unwrap_or(Value::Nil))
}

/// Declaration of a logical type and its explicit field accessors.
///
/// Fields not declared here fall back to [`record_accessor`].
#[derive(Clone)]
pub struct TypeDecl {
    pub(crate) name: Arc<str>,
    pub(crate) fields: Vec<(Arc<str>, Accessor)>,
}

impl TypeDecl {
    /// Declares a logical type with the given name.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field with an explicit accessor.
    #[must_use]
    pub fn field<F>(mut self, name: impl Into<Arc<str>>, accessor: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let accessor: Accessor = Arc::new(accessor);
        self.fields.push((name.into(), accessor));
        self
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDecl")
            .field("name", &self.name)
            .field(
                "fields",
                &self.fields.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A field of one logical type that is referenced by at least one condition.
#[derive(Clone)]
pub struct ActiveField {
    /// Owning type.
    pub type_id: TypeId,
    /// Field name.
    pub name: Arc<str>,
    /// Position of this field's value in a fact record's field values.
    pub index: usize,
    accessor: Accessor,
}

impl ActiveField {
    pub(crate) fn new(type_id: TypeId, name: Arc<str>, index: usize, accessor: Accessor) -> Self {
        Self {
            type_id,
            name,
            index,
            accessor,
        }
    }

    /// Reads this field from a fact value.
    #[must_use]
    pub fn read(&self, fact: &Value) -> Value {
        (self.accessor)(fact)
    }
}

impl fmt::Debug for ActiveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActiveField({:?}.{}#{})", self.type_id, self.name, self.index)
    }
}

/// Ordered, deduplicated set of active fields of one type.
///
/// Identifies one join/index granularity: facts are grouped by the values of
/// these fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldsKey {
    /// Dense id within the owning type.
    pub id: usize,
    /// Owning type.
    pub type_id: TypeId,
    /// Active field indices, ascending.
    pub fields: Arc<[usize]>,
}

impl FieldsKey {
    /// Returns the position of active field `index` within this key's rows.
    #[must_use]
    pub fn position(&self, index: usize) -> Option<usize> {
        self.fields.binary_search(&index).ok()
    }

    /// Projects a fact's field values onto this key.
    #[must_use]
    pub fn project(&self, field_values: &[Value]) -> Arc<[Value]> {
        self.fields
            .iter()
            .map(|&i| field_values.get(i).cloned().unwrap_or(Value::Nil))
            .collect()
    }
}

/// Reference to a field of a named fact within a rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Fact binding name, e.g. `$customer`.
    pub fact: Arc<str>,
    /// Field name on that fact's type.
    pub field: Arc<str>,
}

impl FieldRef {
    /// Creates a field reference.
    #[must_use]
    pub fn new(fact: impl Into<Arc<str>>, field: impl Into<Arc<str>>) -> Self {
        Self {
            fact: fact.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.fact, self.field)
    }
}
