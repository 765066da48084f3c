//! Application services - the pipeline use cases.
//!
//! Services depend on ports (traits), never on concrete adapters.

pub mod element_resolver;
pub mod executor;
pub(crate) mod extract;
pub mod flattener;
pub mod matcher;
pub mod provider_loader;
pub mod render_service;

pub use element_resolver::{ElementResolver, resolve_element};
pub use executor::{ExecutionOptions, ExecutionOutcome, Executor};
pub use flattener::{ELEMENTS_FIELD, FlattenOptions, Flattener, METADATA_FIELD};
pub use matcher::{MatchOptions, MatchResult, Matcher};
pub use provider_loader::{LoadOptions, ProviderLoader};
pub use render_service::{
    COMPONENTS_FIELD, ComponentReport, DEFAULT_NAMESPACE, RenderOptions, RenderReport,
    RenderService,
};
