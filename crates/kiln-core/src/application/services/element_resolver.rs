//! Element resolution and the per-run element cache.
//!
//! [`resolve_element`] turns one raw element value into a typed [`Element`].
//! [`ElementResolver`] memoizes it by FQN for the duration of one flatten
//! run; it is never shared across runs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::application::services::extract;
use crate::domain::{DomainError, Element, ElementKind, Fqn, StructuredValue, ValueError};

/// Resolve one raw element value.
///
/// `kind` is required. Every other field is optional and falls back to its
/// zero value; a present field of the wrong shape is an error naming it.
/// `composes` is only read for composites and `modifies` only for modifiers.
pub fn resolve_element(fqn: &Fqn, raw: &dyn StructuredValue) -> Result<Element, DomainError> {
    let kind = extract::string(raw, "kind")
        .map_err(invalid(fqn, "kind"))?
        .ok_or_else(|| DomainError::InvalidElementField {
            fqn: fqn.to_string(),
            field: "kind",
            reason: "is required".into(),
        })?;
    let kind: ElementKind = kind
        .parse()
        .map_err(|e: DomainError| DomainError::InvalidElementField {
            fqn: fqn.to_string(),
            field: "kind",
            reason: e.to_string(),
        })?;

    let mut builder = Element::builder(fqn.clone(), kind)
        .name(extract::string_or_default(raw, "name").map_err(invalid(fqn, "name"))?)
        .api_version(
            extract::string_or_default(raw, "#apiVersion").map_err(invalid(fqn, "#apiVersion"))?,
        )
        .target(extract::string_list(raw, "target").map_err(invalid(fqn, "target"))?)
        .labels(extract::string_map(raw, "labels").map_err(invalid(fqn, "labels"))?)
        .description(
            extract::string_or_default(raw, "description").map_err(invalid(fqn, "description"))?,
        );

    if let Some(schema) = raw.lookup("schema") {
        builder = builder.schema(schema);
    }

    builder = match kind {
        ElementKind::Composite => builder
            .composes(extract::string_list(raw, "composes").map_err(invalid(fqn, "composes"))?),
        ElementKind::Modifier => builder
            .modifies(extract::string_list(raw, "modifies").map_err(invalid(fqn, "modifies"))?),
        ElementKind::Primitive => builder,
    };

    builder.build()
}

fn invalid<'a>(fqn: &'a Fqn, field: &'static str) -> impl Fn(ValueError) -> DomainError + 'a {
    move |e| DomainError::InvalidElementField {
        fqn: fqn.to_string(),
        field,
        reason: e.to_string(),
    }
}

/// FQN-keyed element cache owned by one flatten run.
#[derive(Debug, Default)]
pub struct ElementResolver {
    cache: HashMap<Fqn, Arc<Element>>,
    hits: usize,
}

impl ElementResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `raw` as `fqn`, or return the element cached for `fqn`.
    ///
    /// Once an FQN is cached, later calls ignore `raw` entirely.
    pub fn resolve(
        &mut self,
        fqn: &Fqn,
        raw: &dyn StructuredValue,
    ) -> Result<Arc<Element>, DomainError> {
        if let Some(hit) = self.get(fqn) {
            return Ok(hit);
        }

        let element = Arc::new(resolve_element(fqn, raw)?);
        debug!(
            fqn = %fqn,
            kind = %element.kind,
            hash = %element.content_hash,
            "Resolved element"
        );
        self.cache.insert(fqn.clone(), Arc::clone(&element));
        Ok(element)
    }

    /// Cached element for `fqn`, if any.
    pub fn get(&mut self, fqn: &Fqn) -> Option<Arc<Element>> {
        let hit = self.cache.get(fqn).cloned();
        if hit.is_some() {
            self.hits += 1;
            trace!(fqn = %fqn, "Element cache hit");
        }
        hit
    }

    /// Cache an element obtained elsewhere (e.g. from a registry).
    pub fn insert(&mut self, element: Element) -> Arc<Element> {
        let element = Arc::new(element);
        self.cache
            .insert(element.fqn.clone(), Arc::clone(&element));
        element
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}
