//! Composite Flattener - expands composites into primitive and modifier leaves.
//!
//! Flattening a component:
//! 1. Resolve every entry under `#elements`
//! 2. Insert primitives and modifiers directly
//! 3. Expand composites recursively, stamping provenance on every leaf
//! 4. Merge all leaves into the component, applying the collision policy
//!
//! Directly listed elements must resolve; composed references that cannot
//! be resolved are recorded as warnings and skipped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    application::{
        ApplicationError,
        ports::ElementRegistry,
        services::element_resolver::ElementResolver,
    },
    domain::{
        CollisionPolicy, Component, DomainError, DomainValidator as validator, Element,
        ElementKind, FlattenWarning, Fqn, Provenance, SharedValue, StructuredValue,
    },
    error::KilnResult,
};

/// Field holding a component's opaque metadata.
pub const METADATA_FIELD: &str = "#metadata";
/// Field holding a component's element entries, keyed by FQN.
pub const ELEMENTS_FIELD: &str = "#elements";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenOptions {
    pub collision: CollisionPolicy,
}

/// Expands composite elements into a flat set of leaves.
pub struct Flattener {
    registry: Arc<dyn ElementRegistry>,
    options: FlattenOptions,
}

/// Caches owned by one flatten run.
#[derive(Default)]
struct FlattenRun {
    resolver: ElementResolver,
    /// Finished expansions keyed by composite FQN. A composite reached
    /// again, from any component of the run, reuses its leaves.
    expansions: HashMap<Fqn, Arc<Expanded>>,
}

/// Leaves of one composite before the top-level origin is stamped.
#[derive(Debug, Default)]
struct Expanded {
    /// Leaf and its immediate parent composite, one entry per FQN; a
    /// later path to the same leaf replaces the earlier parent.
    leaves: BTreeMap<Fqn, (Arc<Element>, Fqn)>,
    warnings: Vec<FlattenWarning>,
}

impl Expanded {
    fn absorb(&mut self, inner: &Expanded) {
        for (fqn, leaf) in &inner.leaves {
            self.leaves.insert(fqn.clone(), leaf.clone());
        }
        for warning in &inner.warnings {
            self.warn(warning.clone());
        }
    }

    fn warn(&mut self, warning: FlattenWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

impl Flattener {
    pub fn new(registry: Arc<dyn ElementRegistry>) -> Self {
        Self {
            registry,
            options: FlattenOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FlattenOptions) -> Self {
        self.options = options;
        self
    }

    /// Flatten one component with a fresh element cache.
    pub fn flatten_component(&self, id: &str, raw: SharedValue) -> KilnResult<Component> {
        let mut run = FlattenRun::default();
        self.flatten_with(&mut run, id, raw)
    }

    /// Flatten every component of a module's `components` struct.
    ///
    /// All components share one element cache; order follows the value's
    /// field order.
    #[instrument(skip_all)]
    pub fn flatten_module(&self, components: &dyn StructuredValue) -> KilnResult<Vec<Component>> {
        let mut run = FlattenRun::default();
        let entries = components
            .fields()
            .map_err(|e| ApplicationError::InvalidModule {
                reason: format!("components: {e}"),
            })?;

        let mut flattened = Vec::new();
        for (id, raw) in entries {
            flattened.push(self.flatten_with(&mut run, &id, raw)?);
        }

        debug!(
            components = flattened.len(),
            cached_elements = run.resolver.len(),
            cache_hits = run.resolver.hits(),
            expanded_composites = run.expansions.len(),
            "Module flattened"
        );
        Ok(flattened)
    }

    #[instrument(skip_all, fields(component = %id))]
    fn flatten_with(&self, run: &mut FlattenRun, id: &str, raw: SharedValue) -> KilnResult<Component> {
        let metadata = raw.lookup(METADATA_FIELD);
        let elements = raw.lookup(ELEMENTS_FIELD);
        let mut component = Component::new(id, raw).with_metadata(metadata);

        let Some(elements) = elements else {
            debug!("Component has no #elements");
            return Ok(component);
        };
        let entries = elements
            .fields()
            .map_err(|e| ApplicationError::InvalidComponent {
                component: id.to_owned(),
                reason: format!("{ELEMENTS_FIELD}: {e}"),
            })?;

        // 1. Resolve every entry first so composites can reach their
        //    siblings through the cache; failure here aborts the component
        let mut resolved = Vec::new();
        for (label, value) in entries {
            let fqn = Fqn::from(label);
            let element = run.resolver.resolve(&fqn, value.as_ref()).map_err(|e| {
                ApplicationError::Resolution {
                    component: id.to_owned(),
                    fqn: fqn.clone(),
                    reason: e.to_string(),
                }
            })?;
            resolved.push((fqn, element));
        }

        for (fqn, element) in resolved {
            match element.kind {
                // 2. Leaves go straight in
                ElementKind::Primitive | ElementKind::Modifier => {
                    let leaf = element.with_provenance(Provenance::direct(element.content_hash));
                    self.merge(&mut component, leaf)?;
                }
                // 3. Composites expand recursively
                ElementKind::Composite => {
                    let expanded = self.expand(run, id, &mut Vec::new(), &element)?;
                    debug!(composite = %fqn, leaves = expanded.leaves.len(), "Expanded composite");
                    for warning in &expanded.warnings {
                        if !component.warnings.contains(warning) {
                            component.warnings.push(warning.clone());
                        }
                    }

                    // 4. Merge, stamping this entry as the origin
                    for (leaf, via) in expanded.leaves.values() {
                        let provenance =
                            Provenance::expanded(fqn.clone(), via.clone(), leaf.content_hash);
                        self.merge(&mut component, leaf.with_provenance(provenance))?;
                    }
                    component.provenance.push(fqn);
                }
            }
        }

        validator::validate_flattened(&component)?;
        info!(
            elements = component.elements.len(),
            composites = component.provenance.len(),
            warnings = component.warnings.len(),
            "Component flattened"
        );
        Ok(component)
    }

    /// Expand one composite into its leaves.
    ///
    /// `visiting` holds the composites on the current recursion path,
    /// outermost first. A finished expansion is acyclic, so memo hits skip
    /// the cycle check.
    fn expand(
        &self,
        run: &mut FlattenRun,
        component: &str,
        visiting: &mut Vec<Fqn>,
        composite: &Element,
    ) -> KilnResult<Arc<Expanded>> {
        if let Some(done) = run.expansions.get(&composite.fqn) {
            return Ok(Arc::clone(done));
        }

        visiting.push(composite.fqn.clone());
        let mut expanded = Expanded::default();

        for reference in &composite.composes {
            if let Some(start) = visiting.iter().position(|f| f == reference) {
                let mut path: Vec<String> =
                    visiting[start..].iter().map(ToString::to_string).collect();
                path.push(reference.to_string());
                return Err(DomainError::CompositeCycle {
                    component: component.to_owned(),
                    path,
                }
                .into());
            }

            let resolved = match self.lookup(&mut run.resolver, reference) {
                Ok(element) => element,
                Err(reason) => {
                    warn!(
                        composite = %composite.fqn,
                        reference = %reference,
                        %reason,
                        "Skipping unresolved composed element"
                    );
                    expanded.warn(FlattenWarning::UnresolvedReference {
                        composite: composite.fqn.clone(),
                        reference: reference.clone(),
                        reason,
                    });
                    continue;
                }
            };

            match resolved.kind {
                ElementKind::Composite => {
                    let inner = self.expand(run, component, visiting, &resolved)?;
                    expanded.absorb(&inner);
                }
                ElementKind::Primitive | ElementKind::Modifier => {
                    expanded
                        .leaves
                        .insert(resolved.fqn.clone(), (resolved, composite.fqn.clone()));
                }
            }
        }

        visiting.pop();
        let expanded = Arc::new(expanded);
        run.expansions.insert(composite.fqn.clone(), Arc::clone(&expanded));
        Ok(expanded)
    }

    /// Cache first, registry second.
    fn lookup(&self, resolver: &mut ElementResolver, fqn: &Fqn) -> Result<Arc<Element>, String> {
        if let Some(cached) = resolver.get(fqn) {
            return Ok(cached);
        }
        let element = self.registry.resolve_by_fqn(fqn).map_err(|e| e.to_string())?;
        debug!(fqn = %fqn, "Resolved composed element from registry");
        Ok(resolver.insert(element))
    }

    fn merge(&self, component: &mut Component, leaf: Element) -> KilnResult<()> {
        let replaced = component
            .elements
            .get(&leaf.fqn)
            .filter(|existing| existing.content_hash != leaf.content_hash)
            .map(|existing| (existing.content_hash, existing.provenance.to_string()));

        if let Some((replaced_hash, first)) = replaced {
            match self.options.collision {
                CollisionPolicy::RequireIdentical => {
                    return Err(DomainError::ElementConflict {
                        component: component.id.clone(),
                        fqn: leaf.fqn.to_string(),
                        first,
                        second: leaf.provenance.to_string(),
                    }
                    .into());
                }
                CollisionPolicy::LastWriteWins => {
                    warn!(
                        fqn = %leaf.fqn,
                        replaced = %replaced_hash,
                        kept = %leaf.content_hash,
                        "Element collision; keeping the later definition"
                    );
                    component.warnings.push(FlattenWarning::Collision {
                        fqn: leaf.fqn.clone(),
                        replaced: replaced_hash,
                        kept: leaf.content_hash,
                    });
                }
            }
        }

        component.elements.insert(leaf.fqn.clone(), leaf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockElementRegistry, RegistryError};
    use crate::domain::structured_value::testing::value;
    use crate::error::KilnError;
    use serde_json::{Value, json};

    fn no_registry() -> Arc<dyn ElementRegistry> {
        let mut registry = MockElementRegistry::new();
        registry
            .expect_resolve_by_fqn()
            .returning(|fqn| Err(RegistryError::NotFound(fqn.clone())));
        Arc::new(registry)
    }

    fn primitive(name: &str) -> Value {
        json!({"name": name, "kind": "primitive", "schema": {"field": name}})
    }

    fn composite(composes: &[&str]) -> Value {
        json!({"kind": "composite", "composes": composes})
    }

    fn component(elements: Value) -> SharedValue {
        value(json!({
            "#metadata": {"name": "web"},
            "#elements": elements,
            "container": {"image": "nginx"}
        }))
    }

    #[test]
    fn stateless_provenance_propagates() {
        let raw = component(json!({
            "x.Stateless": composite(&["x.Container", "x.Replicas"]),
            "x.Container": primitive("Container"),
            "x.Replicas": primitive("Replicas"),
        }));

        let flat = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap();

        let fqns: Vec<_> = flat.element_fqns().map(Fqn::as_str).collect();
        assert_eq!(fqns, vec!["x.Container", "x.Replicas"]);
        for element in flat.elements.values() {
            assert_eq!(
                element.provenance.source_composite,
                Some(Fqn::from("x.Stateless"))
            );
        }
        assert_eq!(flat.provenance, vec![Fqn::from("x.Stateless")]);
        assert!(flat.is_flat());
    }

    #[test]
    fn nested_composites_record_top_origin_and_immediate_parent() {
        let raw = component(json!({
            "x.Container": primitive("Container"),
            "x.Expose": primitive("Expose"),
            "x.Base": composite(&["x.Container"]),
            "x.Web": composite(&["x.Base", "x.Expose"]),
        }));

        let flat = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap();

        // x.Base is also listed directly, but x.Web is declared after it so
        // its expansion is the final write for x.Container.
        let container = flat.element("x.Container").unwrap();
        assert_eq!(container.provenance.source_composite, Some(Fqn::from("x.Web")));
        assert_eq!(container.provenance.via_composite, Some(Fqn::from("x.Base")));

        let expose = flat.element("x.Expose").unwrap();
        assert_eq!(expose.provenance.via_composite, Some(Fqn::from("x.Web")));
        assert!(flat.warnings.is_empty());
    }

    #[test]
    fn later_declared_composite_wins_regardless_of_name() {
        let raw = component(json!({
            "x.Container": primitive("Container"),
            "x.Zeta": composite(&["x.Container"]),
            "x.Alpha": composite(&["x.Container"]),
        }));

        let flat = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap();

        let container = flat.element("x.Container").unwrap();
        assert_eq!(container.provenance.source_composite, Some(Fqn::from("x.Alpha")));
        assert_eq!(flat.provenance, vec![Fqn::from("x.Zeta"), Fqn::from("x.Alpha")]);
    }

    #[test]
    fn flattening_a_flat_component_is_identity() {
        let raw = component(json!({
            "x.Container": primitive("Container"),
            "x.Replicas": primitive("Replicas"),
        }));
        let flattener = Flattener::new(no_registry());

        let once = flattener.flatten_component("web", raw.clone()).unwrap();
        let twice = flattener.flatten_component("web", raw).unwrap();

        assert_eq!(once.elements, twice.elements);
        assert_eq!(once.elements.len(), 2);
        assert!(once.provenance.is_empty());
        assert!(once.elements.values().all(|e| e.provenance.is_direct()));
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let raw = component(json!({
            "x.A": composite(&["x.B"]),
            "x.B": composite(&["x.A"]),
        }));

        let err = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap_err();

        match err {
            KilnError::Domain(DomainError::CompositeCycle { component, path }) => {
                assert_eq!(component, "web");
                assert_eq!(path, vec!["x.A", "x.B", "x.A"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_composition_is_a_cycle() {
        let raw = component(json!({"x.A": composite(&["x.A"])}));
        let err = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap_err();
        assert!(matches!(err, KilnError::Domain(DomainError::CompositeCycle { .. })));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let raw = component(json!({
            "x.Top": composite(&["x.Left", "x.Right"]),
            "x.Left": composite(&["x.Shared"]),
            "x.Right": composite(&["x.Shared"]),
            "x.Shared": composite(&["x.Container"]),
            "x.Container": primitive("Container"),
        }));

        let flat = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap();
        assert_eq!(flat.elements.len(), 1);
    }

    #[test]
    fn layered_diamonds_expand_each_composite_once() {
        // Every layer composes both nodes of the next one, so the number
        // of paths doubles per layer.
        const LAYERS: usize = 40;
        let mut elements = serde_json::Map::new();
        elements.insert("x.Container".into(), primitive("Container"));
        elements.insert("x.Top".into(), composite(&["x.L0a", "x.L0b"]));
        for layer in 0..LAYERS {
            let next: Vec<String> = if layer + 1 == LAYERS {
                vec!["x.Container".into(), "x.Missing".into()]
            } else {
                vec![format!("x.L{}a", layer + 1), format!("x.L{}b", layer + 1)]
            };
            let next: Vec<&str> = next.iter().map(String::as_str).collect();
            for side in ["a", "b"] {
                elements.insert(format!("x.L{layer}{side}"), composite(&next));
            }
        }

        let flat = Flattener::new(no_registry())
            .flatten_component("web", component(Value::Object(elements)))
            .unwrap();

        let container = flat.element("x.Container").unwrap();
        assert_eq!(flat.elements.len(), 1);
        assert_eq!(
            container.provenance.via_composite,
            Some(Fqn::from(format!("x.L{}b", LAYERS - 1)))
        );
        assert_eq!(
            flat.warnings
                .iter()
                .filter(|w| matches!(w, FlattenWarning::UnresolvedReference { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn unresolved_composed_reference_warns_and_continues() {
        let raw = component(json!({
            "x.Stateless": composite(&["x.Container", "x.Missing"]),
            "x.Container": primitive("Container"),
        }));

        let flat = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap();

        assert_eq!(flat.elements.len(), 1);
        assert!(matches!(
            &flat.warnings[..],
            [FlattenWarning::UnresolvedReference { reference, .. }] if reference.as_str() == "x.Missing"
        ));
    }

    #[test]
    fn direct_resolution_failure_aborts() {
        let raw = component(json!({"x.Broken": {"name": "Broken"}}));
        let err = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap_err();
        match err {
            KilnError::Application(ApplicationError::Resolution { fqn, component, .. }) => {
                assert_eq!(fqn.as_str(), "x.Broken");
                assert_eq!(component, "web");
            }
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn composed_references_fall_back_to_registry() {
        let mut registry = MockElementRegistry::new();
        registry
            .expect_resolve_by_fqn()
            .withf(|fqn| fqn.as_str() == "x.Replicas")
            .times(1)
            .returning(|fqn| {
                Element::builder(fqn.clone(), ElementKind::Primitive)
                    .build()
                    .map_err(|e| RegistryError::Invalid {
                        fqn: fqn.clone(),
                        reason: e.to_string(),
                    })
            });

        let raw = component(json!({
            "x.Stateless": composite(&["x.Container", "x.Replicas"]),
            "x.Container": primitive("Container"),
        }));

        let flat = Flattener::new(Arc::new(registry))
            .flatten_component("web", raw)
            .unwrap();
        assert!(flat.element("x.Replicas").is_some());
    }

    #[test]
    fn module_shares_one_cache_across_components() {
        let mut registry = MockElementRegistry::new();
        registry
            .expect_resolve_by_fqn()
            .times(1)
            .returning(|fqn| {
                Element::builder(fqn.clone(), ElementKind::Primitive)
                    .build()
                    .map_err(|e| RegistryError::Invalid {
                        fqn: fqn.clone(),
                        reason: e.to_string(),
                    })
            });

        let components = value(json!({
            "api": {"#elements": {"x.Stateless": composite(&["x.Container"])}},
            "web": {"#elements": {"x.Stateless": composite(&["x.Container"])}},
        }));

        let flat = Flattener::new(Arc::new(registry))
            .flatten_module(components.as_ref())
            .unwrap();
        let ids: Vec<_> = flat.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["api", "web"]);
        assert!(flat.iter().all(|c| c.element("x.Container").is_some()));
    }

    #[test]
    fn differing_collision_warns_by_default_and_fails_when_strict() {
        let raw = component(json!({
            "x.A": composite(&["x.Container"]),
            "x.Container": {"kind": "primitive", "schema": {"v": 1}},
        }));
        // Direct x.Container and x.A's expansion reuse the same cached
        // element, so no collision here.
        let flat = Flattener::new(no_registry())
            .flatten_component("web", raw)
            .unwrap();
        assert!(flat.warnings.is_empty());

        let mut left = Component::new("web", value(json!({})));
        let first = Element::builder("x.Container", ElementKind::Primitive)
            .api_version("v0")
            .build()
            .unwrap();
        let second = Element::builder("x.Container", ElementKind::Primitive)
            .api_version("v1")
            .build()
            .unwrap();

        let lenient = Flattener::new(no_registry());
        lenient.merge(&mut left, first.clone()).unwrap();
        lenient.merge(&mut left, second.clone()).unwrap();
        assert_eq!(left.element("x.Container").unwrap().api_version, "v1");
        assert!(matches!(left.warnings[..], [FlattenWarning::Collision { .. }]));

        let strict = Flattener::new(no_registry()).with_options(FlattenOptions {
            collision: CollisionPolicy::RequireIdentical,
        });
        let mut right = Component::new("web", value(json!({})));
        strict.merge(&mut right, first).unwrap();
        let err = strict.merge(&mut right, second).unwrap_err();
        assert!(matches!(err, KilnError::Domain(DomainError::ElementConflict { .. })));
    }

    #[test]
    fn component_without_elements_is_empty() {
        let flat = Flattener::new(no_registry())
            .flatten_component("web", value(json!({"image": "nginx"})))
            .unwrap();
        assert!(flat.elements.is_empty());
        assert!(flat.metadata.is_none());
    }
}
