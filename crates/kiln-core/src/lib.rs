//! Kiln Core - Hexagonal Architecture Implementation
//!
//! This crate provides the domain and application layers for Kiln, a
//! renderer that turns declarative component descriptions into concrete
//! platform resources.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             kiln-cli (CLI)              │
//! │       (Implements Driving Ports)        │
//! └──────────────────┬──────────────────────┘
//!                    │ calls
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │          Application Services           │
//! │  (Flattener, Matcher, Executor, Render) │
//! │          Orchestrates Use Cases         │
//! └──────────────────┬──────────────────────┘
//!                    │ uses
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │       Application Ports (Traits)        │
//! │ (Driven: Value, Registry, Engine)       │
//! └──────────────────┬──────────────────────┘
//!                    │ implemented by
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │     kiln-adapters (Infrastructure)      │
//! │ (JsonValue, InMemoryRegistry, Engine)   │
//! └─────────────────────────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │        Domain Layer (Pure Logic)        │
//! │   (Element, Component, Provider, ...)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! ProviderLoader ──► Provider
//! Flattener      ──► flattened Component
//! Matcher(Component, Provider)            ──► selected Transformers
//! Executor(Component, selected, context)  ──► ordered resources
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiln_core::prelude::*;
//!
//! # async fn run(
//! #     provider: Provider,
//! #     registry: Arc<dyn ElementRegistry>,
//! #     engine: Arc<dyn EvaluationEngine>,
//! #     module: SharedValue,
//! # ) -> KilnResult<()> {
//! let service = RenderService::new(
//!     Arc::new(provider),
//!     registry,
//!     engine,
//!     RenderOptions::default(),
//! );
//! let report = service.render_module(module.as_ref()).await?;
//! println!("{} resources", report.resources.len());
//! # Ok(())
//! # }
//! ```

pub mod domain;

pub mod application;

pub mod error;

// Public API - what external crates should use
pub mod prelude {
    pub use crate::application::{
        ExecutionOptions, ExecutionOutcome, Executor, FlattenOptions, Flattener, LoadOptions,
        MatchOptions, MatchResult, Matcher, ProviderLoader, RenderOptions, RenderReport,
        RenderService,
        ports::{
            EngineConcurrency, EngineError, ElementRegistry, EvaluationEngine, RegistryError,
        },
    };
    pub use crate::domain::{
        CollisionPolicy, Component, ContentHash, Element, ElementKind, ExecutionContext,
        ExecutionResult, Fqn, MatchStrategy, Provenance, Provider, SharedValue, StructuredValue,
        Transformer, ValueError,
    };
    pub use crate::error::{KilnError, KilnResult};
}

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
