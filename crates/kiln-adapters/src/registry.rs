//! In-memory element registry.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::{debug, instrument};

use kiln_core::{
    application::{ApplicationError, ElementRegistry, RegistryError, resolve_element},
    domain::{DomainValidator as validator, Element, Fqn, StructuredValue},
    error::{KilnError, KilnResult},
};

/// Thread-safe in-memory element registry.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone, Default)]
pub struct InMemoryElementRegistry {
    inner: Arc<RwLock<HashMap<Fqn, Element>>>,
}

impl InMemoryElementRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a catalog: a struct of raw element
    /// definitions keyed by FQN.
    #[instrument(skip_all)]
    pub fn from_catalog(catalog: &dyn StructuredValue) -> KilnResult<Self> {
        let registry = Self::new();
        registry.load_catalog(catalog)?;
        Ok(registry)
    }

    /// Resolve and register every entry of a catalog.
    pub fn load_catalog(&self, catalog: &dyn StructuredValue) -> KilnResult<usize> {
        let entries = catalog
            .fields()
            .map_err(|e| ApplicationError::InvalidModule {
                reason: format!("element catalog: {e}"),
            })?;

        let mut count = 0;
        for (key, raw) in entries {
            let fqn = Fqn::from(key);
            let element = resolve_element(&fqn, raw.as_ref())?;
            self.insert(element)?;
            count += 1;
        }
        debug!(count, "Loaded element catalog");
        Ok(count)
    }

    /// Register one element, replacing any previous entry for its FQN.
    pub fn insert(&self, element: Element) -> KilnResult<()> {
        validator::validate_element(&element).map_err(KilnError::Domain)?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| ApplicationError::RegistryLock)?;
        inner.insert(element.fqn.clone(), element);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered FQNs in ascending order.
    pub fn fqns(&self) -> KilnResult<Vec<Fqn>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ApplicationError::RegistryLock)?;
        let mut fqns: Vec<Fqn> = inner.keys().cloned().collect();
        fqns.sort();
        Ok(fqns)
    }
}

impl ElementRegistry for InMemoryElementRegistry {
    fn resolve_by_fqn(&self, fqn: &Fqn) -> Result<Element, RegistryError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".into()))?;

        inner
            .get(fqn)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(fqn.clone()))
    }
}
