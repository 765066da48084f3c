//! Provider and Transformer records.
//!
//! A provider is a bundle of transformers for one target platform. Both are
//! built by the provider loader and shared read-only with the matcher and
//! the executor.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::{error::DomainError, structured_value::SharedValue, value_objects::Fqn};

// ── Transformer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformerMetadata {
    pub fqn: Fqn,
    pub name: String,
    pub api_version: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// One provider-supplied rule mapping component elements to resources.
#[derive(Debug, Clone)]
pub struct Transformer {
    pub metadata: TransformerMetadata,
    pub resources: Vec<String>,
    pub traits: Vec<String>,
    pub policies: Vec<String>,
    /// Executable template, evaluated by the engine.
    pub transform: Option<SharedValue>,
    /// Full raw transformer value, used for input validation.
    pub schema: Option<SharedValue>,
    /// SHA-256 hex, present when the loader computed hashes.
    pub hash: Option<String>,
}

impl Transformer {
    pub fn new(metadata: TransformerMetadata) -> Self {
        Self {
            metadata,
            resources: Vec::new(),
            traits: Vec::new(),
            policies: Vec::new(),
            transform: None,
            schema: None,
            hash: None,
        }
    }

    pub fn fqn(&self) -> &Fqn {
        &self.metadata.fqn
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// `resources ∪ traits ∪ policies`, in declaration order.
    pub fn declarations(&self) -> impl Iterator<Item = &str> {
        self.resources
            .iter()
            .chain(&self.traits)
            .chain(&self.policies)
            .map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |reason: &str| DomainError::InvalidTransformer {
            fqn: self.fqn().to_string(),
            reason: reason.to_owned(),
        };

        if self.metadata.name.trim().is_empty() {
            return Err(invalid("metadata.name is empty"));
        }
        if self.transform.is_none() {
            return Err(invalid("no #transform template"));
        }
        if self.declarations().next().is_none() {
            return Err(invalid("declares no resources, traits or policies"));
        }
        Ok(())
    }
}

impl fmt::Display for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fqn().as_str())
    }
}

// ── Provider ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub name: String,
    pub version: String,
    pub min_version: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// A named target platform's rendering capability.
#[derive(Debug, Clone, Default)]
pub struct Provider {
    pub metadata: ProviderMetadata,
    /// Keyed by FQN; iteration is in ascending FQN order.
    pub transformers: BTreeMap<Fqn, Arc<Transformer>>,
    pub declared_resources: Vec<String>,
    pub declared_traits: Vec<String>,
    pub declared_policies: Vec<String>,
    pub hash: Option<String>,
    pub schema: Option<SharedValue>,
}

impl Provider {
    pub fn new(metadata: ProviderMetadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn transformer(&self, fqn: &str) -> Option<&Arc<Transformer>> {
        self.transformers.get(fqn)
    }

    /// Add a transformer and refresh the declared unions.
    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformers
            .insert(transformer.fqn().clone(), Arc::new(transformer));
        self.compute_declared();
        self
    }

    /// Recompute the deduplicated declared unions, first-seen order.
    pub fn compute_declared(&mut self) {
        fn union<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
            let mut seen = Vec::new();
            for item in lists.flatten() {
                if !seen.contains(item) {
                    seen.push(item.clone());
                }
            }
            seen
        }

        self.declared_resources = union(self.transformers.values().map(|t| &t.resources));
        self.declared_traits = union(self.transformers.values().map(|t| &t.traits));
        self.declared_policies = union(self.transformers.values().map(|t| &t.policies));
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.metadata.name.trim().is_empty() {
            return Err(DomainError::InvalidProvider("metadata.name is empty".into()));
        }
        for transformer in self.transformers.values() {
            transformer.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metadata.name)?;
        if !self.metadata.version.is_empty() {
            write!(f, "@{}", self.metadata.version)?;
        }
        Ok(())
    }
}
