//! The view a rule action gets of its match.

use std::sync::Arc;

use fixpoint_foundation::{Error, ErrorKind, FactHandle, Result, Value, VersionedHandle};
use fixpoint_storage::{ActionBuffer, RuntimeMeta, SessionMemory};
use tracing::warn;

/// Bound facts of one activation plus a buffer for the changes the action makes.
///
/// Reads see working memory as committed at the start of the round. Changes
/// are buffered and applied at the start of the next round.
pub struct RhsContext<'a> {
    rule: &'a str,
    names: &'a [Arc<str>],
    bindings: &'a [VersionedHandle],
    memory: &'a SessionMemory,
    meta: &'a RuntimeMeta,
    buffer: &'a mut ActionBuffer,
}

impl<'a> RhsContext<'a> {
    pub(crate) fn new(
        rule: &'a str,
        names: &'a [Arc<str>],
        bindings: &'a [VersionedHandle],
        memory: &'a SessionMemory,
        meta: &'a RuntimeMeta,
        buffer: &'a mut ActionBuffer,
    ) -> Self {
        Self {
            rule,
            names,
            bindings,
            memory,
            meta,
            buffer,
        }
    }

    /// Returns the name of the running rule.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        self.rule
    }

    /// Iterates over the rule's fact names.
    pub fn fact_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(|n| &**n)
    }

    fn binding(&self, name: &str) -> Result<VersionedHandle> {
        self.names
            .iter()
            .position(|n| &**n == name)
            .and_then(|i| self.bindings.get(i).copied())
            .ok_or_else(|| Error::new(ErrorKind::UnknownBinding(name.to_string())))
    }

    /// Returns the handle bound to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownBinding`] if the rule declares no such fact.
    pub fn handle(&self, name: &str) -> Result<FactHandle> {
        self.binding(name).map(|b| b.handle)
    }

    /// Returns the value bound to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownBinding`] for an undeclared name, or
    /// [`ErrorKind::FactNotFound`] if the fact is gone.
    pub fn get(&self, name: &str) -> Result<&'a Value> {
        let handle = self.handle(name)?;
        self.memory
            .value(handle)
            .ok_or_else(|| Error::fact_not_found(handle))
    }

    /// Buffers a new fact of the named type.
    ///
    /// Returns `None`, and logs a warning, if the type was never declared.
    pub fn insert(&mut self, type_name: &str, value: impl Into<Value>) -> Option<FactHandle> {
        let Some(type_id) = self.meta.type_id(type_name) else {
            warn!(rule = self.rule, type_name, "insert of undeclared type skipped");
            return None;
        };
        let handle = self.memory.allocate(type_id);
        self.buffer.insert(handle, value.into());
        Some(handle)
    }

    /// Buffers a new value for the fact bound to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownBinding`] for an undeclared name.
    pub fn update(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let handle = self.handle(name)?;
        self.buffer.update(handle, value.into());
        Ok(())
    }

    /// Buffers deletion of the fact bound to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownBinding`] for an undeclared name.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let handle = self.handle(name)?;
        self.buffer.delete(handle);
        Ok(())
    }

    /// Buffers a new value for any live fact.
    pub fn update_fact(&mut self, handle: FactHandle, value: impl Into<Value>) {
        self.buffer.update(handle, value.into());
    }

    /// Buffers deletion of any fact.
    pub fn delete_fact(&mut self, handle: FactHandle) {
        self.buffer.delete(handle);
    }

    /// Iterates over committed facts of the named type.
    pub fn facts_of(&self, type_name: &str) -> impl Iterator<Item = (FactHandle, &'a Value)> + 'a {
        let memory = self.memory;
        self.meta
            .type_id(type_name)
            .into_iter()
            .flat_map(move |t| memory.facts_of(t))
    }
}
