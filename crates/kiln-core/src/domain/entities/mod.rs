pub mod component;
pub mod element;
pub mod execution;
pub mod provider;

pub use crate::domain::DomainError;
pub use component::Component;
pub use element::Element;
pub use provider::{Provider, Transformer};
