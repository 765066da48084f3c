//! Driven (output) ports - implemented by infrastructure.
//!
//! These traits define what the application needs from external systems.
//! The `kiln-adapters` crate provides implementations.

use thiserror::Error;

use crate::domain::{
    Component, Element, ExecutionContext, Fqn, SharedValue, Transformer,
};

/// Failure reported by an [`ElementRegistry`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("element '{0}' not found in registry")]
    NotFound(Fqn),

    #[error("registry entry for '{fqn}' is invalid: {reason}")]
    Invalid { fqn: Fqn, reason: String },

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Port for element lookup outside the current run.
///
/// Consulted by the flattener only when a composed reference is not
/// already in the run's element cache.
///
/// Implemented by:
/// - `kiln_adapters::registry::InMemoryElementRegistry`
#[cfg_attr(test, mockall::automock)]
pub trait ElementRegistry: Send + Sync {
    /// Resolve a fully qualified name to an element.
    fn resolve_by_fqn(&self, fqn: &Fqn) -> Result<Element, RegistryError>;
}

/// Whether an engine tolerates concurrent calls.
///
/// This is a property of the engine, never assumed by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineConcurrency {
    /// Concurrent evaluation from a shared immutable context is safe.
    #[default]
    Shared,
    /// Every call must be serialized behind a single-access gate.
    Serialized,
}

/// Failure reported by an [`EvaluationEngine`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("{0}")]
    Evaluation(String),

    #[error("{0}")]
    Validation(String),
}

/// Port for transform evaluation.
///
/// All methods are synchronous and may block; the executor runs them on
/// blocking worker threads.
///
/// Implemented by:
/// - `kiln_adapters::engine::TemplateEngine` (`${path}` interpolation)
#[cfg_attr(test, mockall::automock)]
pub trait EvaluationEngine: Send + Sync {
    /// Declared concurrency mode of this engine.
    fn concurrency(&self) -> EngineConcurrency;

    /// Check the component's concrete data against the transformer's input
    /// expectations.
    fn validate_input(
        &self,
        transformer: &Transformer,
        component: &Component,
    ) -> Result<(), EngineError>;

    /// Evaluate the transformer's template, producing zero or more resources.
    fn evaluate(
        &self,
        transformer: &Transformer,
        component: &Component,
        context: &ExecutionContext,
    ) -> Result<Vec<SharedValue>, EngineError>;

    /// Check one produced resource against its declared resource shape.
    fn validate_output(
        &self,
        transformer: &Transformer,
        resource: &SharedValue,
    ) -> Result<(), EngineError>;
}
