//! Render Service - renders a whole module through one provider.
//!
//! Flattens every component with a shared element cache, matches each one
//! against the provider, executes the selection and aggregates resources in
//! component order, then transformer FQN order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    application::{
        ApplicationError,
        ports::{ElementRegistry, EvaluationEngine},
        services::{
            executor::{ExecutionOptions, Executor},
            extract,
            flattener::{FlattenOptions, Flattener, METADATA_FIELD},
            matcher::{MatchOptions, Matcher},
        },
    },
    domain::{
        Component, ExecutionContext, ExecutionMetadata, FlattenWarning, Fqn, Provider,
        SharedValue, StructuredValue,
    },
    error::KilnResult,
};

/// Field holding a module's components, keyed by component id.
pub const COMPONENTS_FIELD: &str = "components";

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub namespace: String,
    pub matching: MatchOptions,
    pub execution: ExecutionOptions,
    pub flatten: FlattenOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            matching: MatchOptions::default(),
            execution: ExecutionOptions::default(),
            flatten: FlattenOptions::default(),
        }
    }
}

/// What happened to one component during a render.
#[derive(Debug, Clone)]
pub struct ComponentReport {
    pub component_id: String,
    /// Top-level composites the component's elements came from.
    pub provenance: Vec<Fqn>,
    pub warnings: Vec<FlattenWarning>,
    /// One entry per executed transformer, FQN order.
    pub results: Vec<ExecutionMetadata>,
    pub unmatched: Vec<Fqn>,
}

/// Outcome of one module render.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub run_id: Uuid,
    pub rendered_at: DateTime<Utc>,
    pub module_name: String,
    pub module_version: String,
    pub provider: String,
    pub resources: Vec<SharedValue>,
    pub components: Vec<ComponentReport>,
    /// Transformer failures collected when fail-fast is off.
    pub failures: Vec<ApplicationError>,
}

impl RenderReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&str, &FlattenWarning)> {
        self.components
            .iter()
            .flat_map(|c| c.warnings.iter().map(move |w| (c.component_id.as_str(), w)))
    }
}

/// Orchestrates flatten, match and execute for a module.
pub struct RenderService {
    provider: Arc<Provider>,
    flattener: Flattener,
    matcher: Matcher,
    executor: Executor,
    namespace: String,
}

impl RenderService {
    pub fn new(
        provider: Arc<Provider>,
        registry: Arc<dyn ElementRegistry>,
        engine: Arc<dyn EvaluationEngine>,
        options: RenderOptions,
    ) -> Self {
        Self {
            matcher: Matcher::new(Arc::clone(&provider), options.matching),
            flattener: Flattener::new(registry).with_options(options.flatten),
            executor: Executor::new(engine, options.execution),
            namespace: options.namespace,
            provider,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Flatten every component of `module` without matching or executing.
    pub fn flatten_module(&self, module: &dyn StructuredValue) -> KilnResult<Vec<Component>> {
        let components = module
            .lookup(COMPONENTS_FIELD)
            .ok_or_else(|| ApplicationError::InvalidModule {
                reason: format!("no '{COMPONENTS_FIELD}' field"),
            })?;
        let flattened = self.flattener.flatten_module(components.as_ref())?;
        if flattened.is_empty() {
            return Err(ApplicationError::InvalidModule {
                reason: "module has no components".into(),
            }
            .into());
        }
        Ok(flattened)
    }

    /// Render `module` into an ordered resource list.
    ///
    /// # Errors
    ///
    /// - `InvalidModule` when `#metadata.name` or `components` is missing
    /// - flatten, match and (under fail-fast) execution errors
    /// - `NoResources` when nothing was rendered
    #[instrument(skip_all, fields(provider = %self.provider, run_id = tracing::field::Empty))]
    pub async fn render_module(&self, module: &dyn StructuredValue) -> KilnResult<RenderReport> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let context = self.context(module)?;
        info!(module = %context.module_name, namespace = %context.namespace, "Rendering module");

        let components = self.flatten_module(module)?;

        let mut report = RenderReport {
            run_id,
            rendered_at: Utc::now(),
            module_name: context.module_name.clone(),
            module_version: context.module_version.clone(),
            provider: self.provider.to_string(),
            resources: Vec::new(),
            components: Vec::with_capacity(components.len()),
            failures: Vec::new(),
        };

        for component in components {
            let component = Arc::new(component);
            let matched = self.matcher.match_component(&component)?;
            for fqn in &matched.unmatched {
                warn!(component = %component.id, element = %fqn, "Element not covered by any transformer");
            }

            let mut component_report = ComponentReport {
                component_id: component.id.clone(),
                provenance: component.provenance.clone(),
                warnings: component.warnings.clone(),
                results: Vec::new(),
                unmatched: matched.unmatched.clone(),
            };

            if matched.is_empty() {
                warn!(component = %component.id, "No transformers matched component");
                report.components.push(component_report);
                continue;
            }

            let outcome = self
                .executor
                .execute_all(
                    Arc::clone(&component),
                    &matched.selected,
                    &context,
                    self.provider.name(),
                )
                .await?;

            for result in outcome.results {
                component_report.results.push(result.metadata);
                report.resources.extend(result.resources);
            }
            report.failures.extend(outcome.failures);
            report.components.push(component_report);
        }

        if report.resources.is_empty() {
            return Err(match report.failures.len() {
                0 => ApplicationError::NoResources {
                    module: report.module_name,
                },
                1 => report.failures.remove(0),
                _ => ApplicationError::ExecutionFailed {
                    component: report.module_name,
                    failures: report.failures,
                },
            }
            .into());
        }

        info!(
            resources = report.resources.len(),
            components = report.components.len(),
            failures = report.failures.len(),
            "Render complete"
        );
        Ok(report)
    }

    fn context(&self, module: &dyn StructuredValue) -> KilnResult<ExecutionContext> {
        let invalid = |reason: String| ApplicationError::InvalidModule { reason };

        let name = extract::string(module, &format!("{METADATA_FIELD}.name"))
            .map_err(|e| invalid(format!("{METADATA_FIELD}.name: {e}")))?
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| invalid(format!("{METADATA_FIELD}.name is required")))?;
        let version = extract::string_or_default(module, &format!("{METADATA_FIELD}.version"))
            .map_err(|e| invalid(format!("{METADATA_FIELD}.version: {e}")))?;
        let labels = extract::string_map(module, &format!("{METADATA_FIELD}.labels"))
            .map_err(|e| invalid(format!("{METADATA_FIELD}.labels: {e}")))?;

        Ok(labels
            .into_iter()
            .fold(
                ExecutionContext::builder()
                    .module_name(name)
                    .module_version(version)
                    .namespace(self.namespace.as_str())
                    .provider_name(self.provider.name()),
                |builder, (key, value)| builder.label(key, value),
            )
            .build())
    }
}
