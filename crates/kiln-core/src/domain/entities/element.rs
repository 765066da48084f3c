//! The `Element` record and its builder.
//!
//! An element is one unit of platform-agnostic capability. Its content hash
//! is computed once, at `build()`, from the fields that define what the
//! element *is*; labels and description are presentation and do not take
//! part in identity.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{
    error::DomainError,
    structured_value::SharedValue,
    value_objects::{ContentHash, ContentHasher, ElementKind, Fqn},
};

// ── Provenance ───────────────────────────────────────────────────────────────

/// Lineage of a flattened leaf element.
///
/// `source_composite` is the top-level composite listed on the component;
/// `via_composite` is the composite whose `composes` list named the leaf
/// directly. Both are `None` for elements listed directly on a component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub source_composite: Option<Fqn>,
    pub via_composite: Option<Fqn>,
    pub element_hash: Option<ContentHash>,
}

impl Provenance {
    /// Provenance of an element listed directly on a component.
    pub fn direct(element_hash: ContentHash) -> Self {
        Self {
            source_composite: None,
            via_composite: None,
            element_hash: Some(element_hash),
        }
    }

    /// Provenance of a leaf reached by expanding `source` through `via`.
    pub fn expanded(source: Fqn, via: Fqn, element_hash: ContentHash) -> Self {
        Self {
            source_composite: Some(source),
            via_composite: Some(via),
            element_hash: Some(element_hash),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.source_composite.is_none()
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source_composite, &self.via_composite) {
            (None, _) => f.write_str("direct"),
            (Some(source), Some(via)) if source != via => write!(f, "{source} via {via}"),
            (Some(source), _) => write!(f, "{source}"),
        }
    }
}

// ── Element ──────────────────────────────────────────────────────────────────

/// One resolved element.
///
/// Immutable once built; the flattener shares resolved elements behind
/// `Arc` and only clones them to stamp provenance.
#[derive(Debug, Clone)]
pub struct Element {
    pub fqn: Fqn,
    pub name: String,
    pub kind: ElementKind,
    pub api_version: String,
    pub target: Vec<String>,
    pub schema: Option<SharedValue>,
    pub composes: Vec<Fqn>,
    pub modifies: Vec<Fqn>,
    pub labels: BTreeMap<String, String>,
    pub description: String,
    pub content_hash: ContentHash,
    pub provenance: Provenance,
}

impl Element {
    /// Start building an element.
    pub fn builder(fqn: impl Into<Fqn>, kind: ElementKind) -> ElementBuilder {
        ElementBuilder::new(fqn.into(), kind)
    }

    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    /// Copy of this element carrying the given provenance.
    pub fn with_provenance(&self, provenance: Provenance) -> Self {
        Self {
            provenance,
            ..self.clone()
        }
    }

    /// Re-check the kind-gating invariant.
    pub fn validate(&self) -> Result<(), DomainError> {
        check_kind_fields(&self.fqn, self.kind, &self.composes, &self.modifies)
    }
}

impl PartialEq for Element {
    /// Elements are equal when they resolve to the same content and lineage.
    fn eq(&self, other: &Self) -> bool {
        self.fqn == other.fqn
            && self.content_hash == other.content_hash
            && self.provenance == other.provenance
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.fqn, self.kind, self.content_hash)
    }
}

fn check_kind_fields(
    fqn: &Fqn,
    kind: ElementKind,
    composes: &[Fqn],
    modifies: &[Fqn],
) -> Result<(), DomainError> {
    if !composes.is_empty() && kind != ElementKind::Composite {
        return Err(DomainError::KindFieldMismatch {
            fqn: fqn.to_string(),
            kind: kind.as_str(),
            field: "composes",
        });
    }
    if !modifies.is_empty() && kind != ElementKind::Modifier {
        return Err(DomainError::KindFieldMismatch {
            fqn: fqn.to_string(),
            kind: kind.as_str(),
            field: "modifies",
        });
    }
    Ok(())
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Builder for [`Element`].
///
/// `build()` enforces the kind-gating invariant and computes the content
/// hash over `(fqn, kind, apiVersion, canonical schema, composes.., modifies..)`.
pub struct ElementBuilder {
    fqn: Fqn,
    kind: ElementKind,
    name: Option<String>,
    api_version: String,
    target: Vec<String>,
    schema: Option<SharedValue>,
    composes: Vec<Fqn>,
    modifies: Vec<Fqn>,
    labels: BTreeMap<String, String>,
    description: String,
}

impl ElementBuilder {
    fn new(fqn: Fqn, kind: ElementKind) -> Self {
        Self {
            fqn,
            kind,
            name: None,
            api_version: String::new(),
            target: Vec::new(),
            schema: None,
            composes: Vec::new(),
            modifies: Vec::new(),
            labels: BTreeMap::new(),
            description: String::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn target(mut self, target: Vec<String>) -> Self {
        self.target = target;
        self
    }

    pub fn schema(mut self, schema: SharedValue) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn composes<I, F>(mut self, fqns: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Fqn>,
    {
        self.composes = fqns.into_iter().map(Into::into).collect();
        self
    }

    pub fn modifies<I, F>(mut self, fqns: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Fqn>,
    {
        self.modifies = fqns.into_iter().map(Into::into).collect();
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Consume the builder and construct the element.
    ///
    /// # Errors
    ///
    /// - `KindFieldMismatch` if `composes`/`modifies` are set on the wrong kind
    /// - `InvalidElementField` if the schema cannot be exported canonically
    pub fn build(self) -> Result<Element, DomainError> {
        check_kind_fields(&self.fqn, self.kind, &self.composes, &self.modifies)?;

        let schema_bytes = match &self.schema {
            Some(schema) => {
                schema
                    .canonical_bytes()
                    .map_err(|e| DomainError::InvalidElementField {
                        fqn: self.fqn.to_string(),
                        field: "schema",
                        reason: e.to_string(),
                    })?
            }
            None => Vec::new(),
        };

        let content_hash = ContentHasher::new()
            .part(self.fqn.as_str())
            .part(self.kind.as_str())
            .part(&self.api_version)
            .part(&schema_bytes)
            .parts(self.composes.iter().map(Fqn::as_str))
            .parts(self.modifies.iter().map(Fqn::as_str))
            .finish();

        let name = self
            .name
            .unwrap_or_else(|| self.fqn.short_name().to_owned());

        Ok(Element {
            fqn: self.fqn,
            name,
            kind: self.kind,
            api_version: self.api_version,
            target: self.target,
            schema: self.schema,
            composes: self.composes,
            modifies: self.modifies,
            labels: self.labels,
            description: self.description,
            content_hash,
            provenance: Provenance::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::structured_value::testing::value;
    use serde_json::json;

    #[test]
    fn builder_defaults_name_to_short_fqn() {
        let element = Element::builder("elements.kiln.dev/core/v0.Container", ElementKind::Primitive)
            .build()
            .unwrap();
        assert_eq!(element.name, "Container");
        assert!(element.provenance.is_direct());
    }

    #[test]
    fn composes_only_on_composites() {
        let err = Element::builder("x.Web", ElementKind::Primitive)
            .composes(["x.Container"])
            .build()
            .unwrap_err();
        assert!(matches!(err, DomainError::KindFieldMismatch { field: "composes", .. }));

        let err = Element::builder("x.Web", ElementKind::Composite)
            .modifies(["x.Container"])
            .build()
            .unwrap_err();
        assert!(matches!(err, DomainError::KindFieldMismatch { field: "modifies", .. }));
    }

    #[test]
    fn hash_ignores_labels_and_schema_field_order() {
        let a = Element::builder("x.Container", ElementKind::Primitive)
            .api_version("v0")
            .schema(value(json!({"image": "string", "port": "int"})))
            .label("tier", "web")
            .build()
            .unwrap();
        let b = Element::builder("x.Container", ElementKind::Primitive)
            .api_version("v0")
            .schema(value(json!({"port": "int", "image": "string"})))
            .description("different prose")
            .build()
            .unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn hash_changes_with_identity_fields() {
        let base = Element::builder("x.Web", ElementKind::Composite)
            .composes(["x.Container"])
            .build()
            .unwrap();
        let more = Element::builder("x.Web", ElementKind::Composite)
            .composes(["x.Container", "x.Replicas"])
            .build()
            .unwrap();
        let versioned = Element::builder("x.Web", ElementKind::Composite)
            .api_version("v1")
            .composes(["x.Container"])
            .build()
            .unwrap();
        assert_ne!(base.content_hash, more.content_hash);
        assert_ne!(base.content_hash, versioned.content_hash);
    }

    #[test]
    fn provenance_display() {
        let hash = ContentHasher::new().part("h").finish();
        assert_eq!(Provenance::direct(hash).to_string(), "direct");
        assert_eq!(
            Provenance::expanded("x.Web".into(), "x.Web".into(), hash).to_string(),
            "x.Web"
        );
        assert_eq!(
            Provenance::expanded("x.Web".into(), "x.Base".into(), hash).to_string(),
            "x.Web via x.Base"
        );
    }
}
