//! Application layer - use cases and ports.
//!
//! This layer orchestrates the domain:
//! - **Ports**: interfaces the pipeline needs from the outside world
//! - **Services**: flatten, match, execute, load and render

pub mod error;
pub mod ports;
pub mod services;

pub use error::{ApplicationError, LoadStage, ValidationPhase};
pub use ports::{
    ElementRegistry, EngineConcurrency, EngineError, EvaluationEngine, RegistryError,
};
pub use services::{
    COMPONENTS_FIELD, ComponentReport, DEFAULT_NAMESPACE, ELEMENTS_FIELD, METADATA_FIELD, ElementResolver, ExecutionOptions, ExecutionOutcome, Executor,
    FlattenOptions, Flattener, LoadOptions, MatchOptions, MatchResult, Matcher,
    ProviderLoader, RenderOptions, RenderReport, RenderService, resolve_element,
};
