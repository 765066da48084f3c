use crate::domain::{
    entities::{Component, Element, Provider},
    error::DomainError,
};

/// Centralized domain validation.
///
/// Entry points used by services after constructing records from raw
/// values; each delegates to the record's own `validate`.
pub struct DomainValidator;

impl DomainValidator {
    pub fn validate_element(element: &Element) -> Result<(), DomainError> {
        element.validate()
    }

    pub fn validate_provider(provider: &Provider) -> Result<(), DomainError> {
        provider.validate()
    }

    /// A flattened component must hold only leaves, each passing its own
    /// invariants.
    pub fn validate_flattened(component: &Component) -> Result<(), DomainError> {
        for element in component.elements.values() {
            element.validate()?;
            if !element.is_leaf() {
                return Err(DomainError::NotFlattened {
                    component: component.id.clone(),
                    fqn: element.fqn.to_string(),
                });
            }
        }
        Ok(())
    }
}
