//! Application ports (traits) for external dependencies.
//!
//! In hexagonal architecture, ports define interfaces that the application
//! needs from the outside world. Adapters in `kiln-adapters` implement these.
//!
//! ## Port Types
//!
//! - **Driven (Output) Ports**: Called by application, implemented by infrastructure
//!   - `StructuredValue`: evaluated value trees (defined in the domain, re-exported here)
//!   - `ElementRegistry`: lookup of elements not present in the current run
//!   - `EvaluationEngine`: transform evaluation and validation
//!
//! - **Driving (Input) Ports**: Called by external world, implemented by application
//!   - (Defined in CLI layer, implemented by services)

pub mod output;

pub use output::{EngineConcurrency, EngineError, ElementRegistry, EvaluationEngine, RegistryError};
pub use crate::domain::{SharedValue, StructuredValue, ValueError};

#[cfg(test)]
pub use output::{MockElementRegistry, MockEvaluationEngine};
