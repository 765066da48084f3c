//! Execution context handed to transformers and the results they produce.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{structured_value::SharedValue, value_objects::Fqn};

// ── ExecutionContext ─────────────────────────────────────────────────────────

/// Module-level facts available to every transform template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionContext {
    pub module_name: String,
    pub module_version: String,
    pub namespace: String,
    pub provider_name: String,
    pub labels: BTreeMap<String, String>,
}

impl ExecutionContext {
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ExecutionContextBuilder {
    inner: ExecutionContext,
}

impl ExecutionContextBuilder {
    pub fn module_name(mut self, name: impl Into<String>) -> Self {
        self.inner.module_name = name.into();
        self
    }

    pub fn module_version(mut self, version: impl Into<String>) -> Self {
        self.inner.module_version = version.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.inner.namespace = namespace.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.inner.provider_name = name.into();
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.labels.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ExecutionContext {
        self.inner
    }
}

// ── ExecutionResult ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionMetadata {
    pub component_id: String,
    pub transformer_fqn: Fqn,
    pub resource_count: usize,
}

/// Output of one transformer run against one component.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Resources in the order the transformer produced them.
    pub resources: Vec<SharedValue>,
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    pub fn new(
        component_id: impl Into<String>,
        transformer_fqn: Fqn,
        resources: Vec<SharedValue>,
    ) -> Self {
        let metadata = ExecutionMetadata {
            component_id: component_id.into(),
            transformer_fqn,
            resource_count: resources.len(),
        };
        Self {
            resources,
            metadata,
        }
    }

    pub fn transformer_fqn(&self) -> &Fqn {
        &self.metadata.transformer_fqn
    }
}
