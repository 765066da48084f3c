//! Template evaluation engine.
//!
//! A transformer's `#transform` value is a template:
//!
//! ```json
//! {
//!   "requires": ["spec.image"],
//!   "output": {
//!     "apiVersion": "apps/v1",
//!     "kind": "Deployment",
//!     "metadata": {"name": "${componentId}", "namespace": "${context.namespace}"},
//!     "spec": {"replicas": "${component.spec.replicas}"}
//!   }
//! }
//! ```
//!
//! `output` is one resource or a list of resources. Every string may hold
//! `${path}` references into three scopes:
//!
//! - `component`: the component's data
//! - `componentId`: the component id
//! - `context`: the execution context (`module_name`, `namespace`, ...)
//!
//! A string that is exactly one reference takes the referenced value with
//! its type; references embedded in longer strings are rendered as text.
//! `requires` lists component data paths checked by input validation.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{instrument, trace};

use kiln_core::{
    application::{EngineConcurrency, EngineError, EvaluationEngine},
    domain::{Component, ExecutionContext, SharedValue, Transformer},
};

use crate::value::{JsonValue, kind_of};

const OUTPUT_FIELD: &str = "output";
const REQUIRES_FIELD: &str = "requires";

/// Failure while expanding a template.
#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("transformer has no #transform template")]
    MissingTemplate,

    #[error("template has no 'output' field")]
    MissingOutput,

    #[error("'output' must be a struct or a list of structs, found {0}")]
    InvalidOutput(&'static str),

    #[error("unresolved reference '${{{0}}}'")]
    Unresolved(String),

    #[error("unterminated reference in '{0}'")]
    Unterminated(String),

    #[error("cannot read template: {0}")]
    Unreadable(String),
}

impl From<TemplateError> for EngineError {
    fn from(err: TemplateError) -> Self {
        EngineError::Evaluation(err.to_string())
    }
}

/// `${path}` interpolation engine.
///
/// Evaluation is pure, so the engine is [`EngineConcurrency::Shared`]
/// unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine {
    concurrency: EngineConcurrency,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a different concurrency mode.
    pub fn with_concurrency(mut self, concurrency: EngineConcurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    fn template(transformer: &Transformer) -> Result<Value, TemplateError> {
        transformer
            .transform
            .as_ref()
            .ok_or(TemplateError::MissingTemplate)?
            .to_canonical()
            .map_err(|e| TemplateError::Unreadable(e.to_string()))
    }
}

impl EvaluationEngine for TemplateEngine {
    fn concurrency(&self) -> EngineConcurrency {
        self.concurrency
    }

    fn validate_input(
        &self,
        transformer: &Transformer,
        component: &Component,
    ) -> Result<(), EngineError> {
        let template = Self::template(transformer)?;
        let Some(requires) = template.get(REQUIRES_FIELD) else {
            return Ok(());
        };
        let Value::Array(paths) = requires else {
            return Err(EngineError::Validation(format!(
                "'{REQUIRES_FIELD}' must be a list, found {}",
                kind_of(requires)
            )));
        };

        let mut missing = Vec::new();
        for (index, path) in paths.iter().enumerate() {
            let Some(path) = path.as_str() else {
                return Err(EngineError::Validation(format!(
                    "'{REQUIRES_FIELD}' entry {index} must be a string, found {}",
                    kind_of(path)
                )));
            };
            if !component.data.exists(path) {
                missing.push(path);
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "component '{}' is missing required field(s): {}",
                component.id,
                missing.join(", ")
            )))
        }
    }

    #[instrument(skip_all, fields(transformer = %transformer.fqn(), component = %component.id))]
    fn evaluate(
        &self,
        transformer: &Transformer,
        component: &Component,
        context: &ExecutionContext,
    ) -> Result<Vec<SharedValue>, EngineError> {
        let template = Self::template(transformer)?;
        let output = template
            .get(OUTPUT_FIELD)
            .ok_or(TemplateError::MissingOutput)?;

        let scope = Scope {
            component: component
                .data
                .to_canonical()
                .map_err(|e| EngineError::Evaluation(e.to_string()))?,
            component_id: Value::String(component.id.clone()),
            context: serde_json::to_value(context)
                .map_err(|e| EngineError::Evaluation(e.to_string()))?,
        };

        let rendered = scope.render(output)?;
        let resources = match rendered {
            Value::Object(_) => vec![rendered],
            Value::Array(items) => {
                if let Some(bad) = items.iter().find(|item| !item.is_object()) {
                    return Err(TemplateError::InvalidOutput(kind_of(bad)).into());
                }
                items
            }
            other => return Err(TemplateError::InvalidOutput(kind_of(&other)).into()),
        };

        trace!(resources = resources.len(), "Template rendered");
        Ok(resources.into_iter().map(JsonValue::shared).collect())
    }

    fn validate_output(
        &self,
        _transformer: &Transformer,
        resource: &SharedValue,
    ) -> Result<(), EngineError> {
        for field in ["apiVersion", "kind", "metadata.name"] {
            let value = resource
                .lookup(field)
                .ok_or_else(|| EngineError::Validation(format!("resource has no '{field}'")))?;
            let text = value
                .as_string()
                .map_err(|e| EngineError::Validation(format!("resource '{field}': {e}")))?;
            if text.trim().is_empty() {
                return Err(EngineError::Validation(format!("resource '{field}' is empty")));
            }
        }
        Ok(())
    }
}

/// Values visible to `${...}` references.
struct Scope {
    component: Value,
    component_id: Value,
    context: Value,
}

impl Scope {
    fn render(&self, template: &Value) -> Result<Value, TemplateError> {
        match template {
            Value::String(text) => self.interpolate(text),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| Ok::<_, TemplateError>((key.clone(), self.render(value)?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            scalar => Ok(scalar.clone()),
        }
    }

    fn interpolate(&self, text: &str) -> Result<Value, TemplateError> {
        // A lone reference keeps the referenced value's type.
        if let Some(path) = text
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .filter(|path| !path.contains("${") && !path.contains('}'))
        {
            return self.resolve(path.trim()).cloned();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| TemplateError::Unterminated(text.to_owned()))?;
            match self.resolve(after[..end].trim())? {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }

    fn resolve(&self, path: &str) -> Result<&Value, TemplateError> {
        let unresolved = || TemplateError::Unresolved(path.to_owned());
        let mut segments = path.split('.');
        let root = match segments.next() {
            Some("component") => &self.component,
            Some("componentId") => &self.component_id,
            Some("context") => &self.context,
            _ => return Err(unresolved()),
        };

        segments.try_fold(root, |current, segment| {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            next.ok_or_else(unresolved)
        })
    }
}
