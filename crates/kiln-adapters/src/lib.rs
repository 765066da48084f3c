//! Infrastructure adapters for Kiln.
//!
//! This crate implements the ports defined in `kiln-core::application::ports`.
//! It contains all external dependencies and I/O operations.

pub mod engine;
pub mod loader;
pub mod registry;
pub mod value;

// Re-export commonly used adapters
pub use engine::{TemplateEngine, TemplateError};
pub use loader::{DocumentFormat, FileProviderLoader, load_document};
pub use registry::InMemoryElementRegistry;
pub use value::JsonValue;
