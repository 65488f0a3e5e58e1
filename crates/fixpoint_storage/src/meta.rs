//! Runtime metadata: logical types, active fields, evaluators and buckets.
//!
//! [`RuntimeMeta`] is built from persistent collections, so cloning it is
//! O(1). A knowledge base owns one; every session derived from it clones the
//! snapshot and diverges independently when it deploys its own rules.

use std::sync::Arc;

use fixpoint_foundation::{Error, Result, TypeId};

use crate::alpha::{AlphaBucket, AlphaEvaluator, AlphaTest};
use crate::evaluator::{Evaluator, EvaluatorHandle};
use crate::field::{Accessor, ActiveField, FieldsKey, TypeDecl, record_accessor};

/// Identifies one keyed fact storage: a fields key and an alpha bucket of one type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId {
    /// Owning type.
    pub type_id: TypeId,
    /// Fields key id within the type.
    pub fields_key: usize,
    /// Alpha bucket index within the type.
    pub bucket: usize,
}

#[derive(Clone, Debug)]
struct BucketEntry {
    identity: Arc<[AlphaTest]>,
    bucket: AlphaBucket,
}

/// Metadata of one logical type.
#[derive(Clone)]
pub struct TypeMeta {
    id: TypeId,
    name: Arc<str>,
    declared: im::HashMap<Arc<str>, Accessor>,
    active: im::Vector<ActiveField>,
    fields_keys: im::Vector<FieldsKey>,
    alpha: im::Vector<AlphaEvaluator>,
    buckets: im::Vector<BucketEntry>,
    storages: im::Vector<StorageId>,
}

impl TypeMeta {
    fn new(id: TypeId, name: Arc<str>) -> Self {
        let mut meta = Self {
            id,
            name,
            declared: im::HashMap::new(),
            active: im::Vector::new(),
            fields_keys: im::Vector::new(),
            alpha: im::Vector::new(),
            buckets: im::Vector::new(),
            storages: im::Vector::new(),
        };
        // Bucket 0 is always the empty bucket
        meta.register_bucket(Vec::new());
        meta
    }

    /// Returns the type id.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of active fields.
    #[must_use]
    pub fn active_field_count(&self) -> usize {
        self.active.len()
    }

    /// Iterates over active fields in index order.
    pub fn active_fields(&self) -> impl Iterator<Item = &ActiveField> + '_ {
        self.active.iter()
    }

    /// Looks up an active field by name.
    #[must_use]
    pub fn active_field(&self, name: &str) -> Option<&ActiveField> {
        self.active.iter().find(|f| &*f.name == name)
    }

    /// Activates a field, returning its value index.
    ///
    /// Declared accessors take precedence; other names read record fields.
    pub fn activate_field(&mut self, name: &str) -> usize {
        if let Some(field) = self.active_field(name) {
            return field.index;
        }
        let name: Arc<str> = name.into();
        let accessor = self
            .declared
            .get(&name)
            .cloned()
            .unwrap_or_else(|| record_accessor(name.clone()));
        let index = self.active.len();
        self.active
            .push_back(ActiveField::new(self.id, name, index, accessor));
        index
    }

    /// Returns the fields key for a set of active field indices, creating it if needed.
    pub fn fields_key(&mut self, mut fields: Vec<usize>) -> FieldsKey {
        fields.sort_unstable();
        fields.dedup();
        if let Some(existing) = self.fields_keys.iter().find(|k| *k.fields == *fields) {
            return existing.clone();
        }
        let key = FieldsKey {
            id: self.fields_keys.len(),
            type_id: self.id,
            fields: fields.into(),
        };
        self.fields_keys.push_back(key.clone());
        key
    }

    /// Returns a fields key by id.
    #[must_use]
    pub fn fields_key_by_id(&self, id: usize) -> Option<&FieldsKey> {
        self.fields_keys.get(id)
    }

    /// Registers a single-fact condition, returning its bit.
    ///
    /// The same evaluator over the same fields always maps to the same bit.
    pub fn register_alpha(
        &mut self,
        handle: EvaluatorHandle,
        fields: Vec<usize>,
        evaluator: &Evaluator,
    ) -> usize {
        if let Some(existing) = self
            .alpha
            .iter()
            .find(|a| a.handle == handle && *a.fields == *fields)
        {
            return existing.bit;
        }
        let bit = self.alpha.len();
        self.alpha.push_back(AlphaEvaluator::new(
            bit,
            handle,
            fields.into(),
            evaluator.clone(),
        ));
        bit
    }

    /// Returns the number of registered alpha evaluators.
    #[must_use]
    pub fn alpha_count(&self) -> usize {
        self.alpha.len()
    }

    /// Iterates over alpha evaluators in bit order.
    pub fn alpha_evaluators(&self) -> impl Iterator<Item = &AlphaEvaluator> + '_ {
        self.alpha.iter()
    }

    /// Returns the bucket index for a set of alpha tests, creating it if needed.
    ///
    /// Structurally identical test sets share one bucket.
    pub fn register_bucket(&mut self, tests: Vec<AlphaTest>) -> usize {
        let weighted = tests
            .into_iter()
            .map(|t| {
                let complexity = self.alpha.get(t.bit).map_or(0.0, AlphaEvaluator::complexity);
                (t, complexity)
            })
            .collect();
        let bucket = AlphaBucket::from_tests(weighted);
        let identity: Arc<[AlphaTest]> = bucket.identity().into();
        if let Some(index) = self.buckets.iter().position(|b| b.identity == identity) {
            return index;
        }
        self.buckets.push_back(BucketEntry { identity, bucket });
        self.buckets.len() - 1
    }

    /// Returns a bucket by index.
    #[must_use]
    pub fn bucket(&self, index: usize) -> Option<&AlphaBucket> {
        self.buckets.get(index).map(|b| &b.bucket)
    }

    /// Registers a keyed storage for a fields key and bucket.
    pub fn register_storage(&mut self, fields_key: usize, bucket: usize) -> StorageId {
        let id = StorageId {
            type_id: self.id,
            fields_key,
            bucket,
        };
        if !self.storages.iter().any(|s| *s == id) {
            self.storages.push_back(id);
        }
        id
    }

    /// Iterates over registered storages.
    pub fn storages(&self) -> impl Iterator<Item = &StorageId> + '_ {
        self.storages.iter()
    }
}

impl std::fmt::Debug for TypeMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeMeta")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("alpha", &self.alpha.len())
            .field("buckets", &self.buckets.len())
            .field("storages", &self.storages)
            .finish_non_exhaustive()
    }
}

/// Metadata context shared by a knowledge base and its sessions.
#[derive(Clone, Debug, Default)]
pub struct RuntimeMeta {
    types: im::Vector<TypeMeta>,
    names: im::HashMap<Arc<str>, TypeId>,
    evaluators: im::Vector<Evaluator>,
}

impl RuntimeMeta {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an independent snapshot that shares structure with `self`.
    #[must_use]
    pub fn branch(&self) -> Self {
        self.clone()
    }

    /// Declares a logical type, returning its id.
    ///
    /// Declaring an existing name adds its field accessors to that type.
    /// Accessors of fields that are already active are not replaced.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` types are declared.
    pub fn declare_type(&mut self, decl: TypeDecl) -> TypeId {
        let id = match self.names.get(&decl.name) {
            Some(id) => *id,
            None => {
                let Ok(raw) = u32::try_from(self.types.len()) else {
                    panic!("too many logical types");
                };
                let id = TypeId::new(raw);
                self.types.push_back(TypeMeta::new(id, decl.name.clone()));
                self.names.insert(decl.name.clone(), id);
                id
            }
        };
        if let Some(meta) = self.types.get_mut(id.index()) {
            for (name, accessor) in decl.fields {
                meta.declared.insert(name, accessor);
            }
        }
        id
    }

    /// Looks up a type by name.
    #[must_use]
    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    /// Looks up a type by name.
    ///
    /// # Errors
    ///
    /// Returns [`fixpoint_foundation::ErrorKind::UnknownType`] if the name was never declared.
    pub fn resolve(&self, name: &str) -> Result<TypeId> {
        self.type_id(name).ok_or_else(|| Error::unknown_type(name))
    }

    /// Returns the metadata of a type.
    #[must_use]
    pub fn type_meta(&self, id: TypeId) -> Option<&TypeMeta> {
        self.types.get(id.index())
    }

    /// Returns the metadata of a type for mutation.
    pub fn type_meta_mut(&mut self, id: TypeId) -> Option<&mut TypeMeta> {
        self.types.get_mut(id.index())
    }

    /// Iterates over all declared types.
    pub fn types(&self) -> impl Iterator<Item = &TypeMeta> + '_ {
        self.types.iter()
    }

    /// Returns the number of declared types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Registers an evaluator, returning its handle.
    ///
    /// Evaluators sharing one predicate (clones) share one handle.
    pub fn register_evaluator(&mut self, evaluator: &Evaluator) -> EvaluatorHandle {
        if let Some(index) = self
            .evaluators
            .iter()
            .position(|e| e.same_predicate(evaluator))
        {
            return EvaluatorHandle(index);
        }
        self.evaluators.push_back(evaluator.clone());
        EvaluatorHandle(self.evaluators.len() - 1)
    }

    /// Returns a registered evaluator.
    #[must_use]
    pub fn evaluator(&self, handle: EvaluatorHandle) -> Option<&Evaluator> {
        self.evaluators.get(handle.0)
    }
}
