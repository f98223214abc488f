//! Target registry and the catalog of registries (one per namespace).
//!
//! Registries are mutable only while they are being loaded. Once handed to
//! an [`Engine`](crate::Engine) they sit behind an `Arc` and every request
//! reads the same snapshot, so concurrent execution never needs a lock here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::models::{Action, Target};
use crate::EngineError;

/// Name of the namespace a top-level request runs in unless told otherwise.
pub const ROOT_NAMESPACE: &str = "";

/// Holds target declarations, keyed by unique name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    targets: HashMap<String, Arc<Target>>,
    /// Names in registration order.
    order: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a target.
    ///
    /// # Errors
    /// [`EngineError::DuplicateTarget`] if `name` is already registered.
    pub fn register<I, S>(
        &mut self,
        name: impl Into<String>,
        prerequisites: I,
        action: Action,
        phony: bool,
    ) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(Target::new(name, prerequisites, action, phony))
    }

    /// Declare an already-built target.
    pub fn insert(&mut self, mut target: Target) -> Result<(), EngineError> {
        if self.targets.contains_key(&target.name) {
            return Err(EngineError::DuplicateTarget(target.name));
        }
        target.dedup_prerequisites();
        self.order.push(target.name.clone());
        self.targets.insert(target.name.clone(), Arc::new(target));
        Ok(())
    }

    /// # Errors
    /// [`EngineError::UnknownTarget`] if nothing is registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&Arc<Target>, EngineError> {
        self.targets.get(name).ok_or_else(|| EngineError::UnknownTarget {
            name: name.to_owned(),
            required_by: None,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Target>> {
        self.targets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Targets in registration order.
    pub fn targets(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.order.iter().filter_map(|name| self.targets.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Every registry the engine knows about, one per topology layer.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    namespaces: BTreeMap<String, Arc<Registry>>,
}

impl Catalog {
    /// A catalog whose root namespace is `root`.
    pub fn new(root: Registry) -> Self {
        Self::default().with_namespace(ROOT_NAMESPACE, root)
    }

    pub fn with_namespace(mut self, name: impl Into<String>, registry: Registry) -> Self {
        self.insert_namespace(name, registry);
        self
    }

    /// Add or replace a namespace.
    pub fn insert_namespace(&mut self, name: impl Into<String>, registry: Registry) {
        self.namespaces.insert(name.into(), Arc::new(registry));
    }

    /// # Errors
    /// [`EngineError::UnknownNamespace`] if `name` was never added.
    pub fn namespace(&self, name: &str) -> Result<&Arc<Registry>, EngineError> {
        self.namespaces
            .get(name)
            .ok_or_else(|| EngineError::UnknownNamespace(name.to_owned()))
    }

    /// `(name, registry)` pairs, root first, then alphabetical.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &Arc<Registry>)> {
        self.namespaces.iter().map(|(k, v)| (k.as_str(), v))
    }
}
