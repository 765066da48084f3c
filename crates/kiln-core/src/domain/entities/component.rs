//! The `Component` record: one deployable unit of a module.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{
    entities::element::Element,
    structured_value::SharedValue,
    value_objects::{ContentHash, Fqn},
};

/// Non-fatal finding recorded while flattening a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlattenWarning {
    /// A composed reference could not be resolved and was skipped.
    UnresolvedReference {
        composite: Fqn,
        reference: Fqn,
        reason: String,
    },
    /// Two expansions produced the same FQN with different content.
    Collision {
        fqn: Fqn,
        replaced: ContentHash,
        kept: ContentHash,
    },
}

impl fmt::Display for FlattenWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedReference {
                composite,
                reference,
                reason,
            } => write!(
                f,
                "composite '{composite}' references '{reference}' which could not be resolved: {reason}"
            ),
            Self::Collision {
                fqn,
                replaced,
                kept,
            } => write!(
                f,
                "element '{fqn}' defined twice with different content ({replaced} replaced by {kept})"
            ),
        }
    }
}

/// One component of a module.
///
/// Before flattening `elements` may hold composites; a component returned by
/// the flattener holds only primitives and modifiers. `elements` is a
/// `BTreeMap` so iteration is always in FQN order.
#[derive(Debug, Clone)]
pub struct Component {
    pub id: String,
    pub metadata: Option<SharedValue>,
    pub elements: BTreeMap<Fqn, Element>,
    /// The raw component value, handed to transformers as concrete data.
    pub data: SharedValue,
    /// Top-level composites this component was expanded from, in order.
    pub provenance: Vec<Fqn>,
    pub warnings: Vec<FlattenWarning>,
}

impl Component {
    pub fn new(id: impl Into<String>, data: SharedValue) -> Self {
        Self {
            id: id.into(),
            metadata: None,
            elements: BTreeMap::new(),
            data,
            provenance: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Option<SharedValue>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.insert(element.fqn.clone(), element);
        self
    }

    pub fn element(&self, fqn: &str) -> Option<&Element> {
        self.elements.get(fqn)
    }

    pub fn element_fqns(&self) -> impl Iterator<Item = &Fqn> {
        self.elements.keys()
    }

    /// Whether every element is a primitive or a modifier.
    pub fn is_flat(&self) -> bool {
        self.elements.values().all(Element::is_leaf)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} elements)", self.id, self.elements.len())
    }
}
