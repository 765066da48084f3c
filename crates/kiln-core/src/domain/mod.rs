//! Core domain layer for Kiln.
//!
//! This module contains the records the pipeline works on: elements,
//! components, providers and transformers, plus the opaque
//! [`StructuredValue`] seam through which concrete data is reached.
//!
//! ## Hexagonal Architecture Compliance
//!
//! - **No async**: Domain logic is synchronous
//! - **No I/O**: No filesystem, network, or external calls
//! - **Immutable records**: published records are shared behind `Arc`
//!
pub mod entities;
pub mod error;
pub mod structured_value;
pub mod value_objects;

mod validation;

pub use entities::{
    component::{Component, FlattenWarning},
    element::{Element, ElementBuilder, Provenance},
    execution::{ExecutionContext, ExecutionContextBuilder, ExecutionMetadata, ExecutionResult},
    provider::{Provider, ProviderMetadata, Transformer, TransformerMetadata},
};

pub use error::{DomainError, ErrorCategory};

pub use structured_value::{SharedValue, StructuredValue, ValueError};

pub use value_objects::{
    CollisionPolicy, ContentHash, ContentHasher, ElementKind, Fqn, MatchStrategy,
};

pub use validation::DomainValidator;
