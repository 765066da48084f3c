// ============================================================================
// domain/error.rs - DOMAIN INVARIANT VIOLATIONS
// ============================================================================

use thiserror::Error;

/// Root domain error type.
///
/// All errors are:
/// - Cloneable (shared across per-component reports)
/// - Categorizable (for CLI display and exit codes)
/// - Actionable (provides suggestions)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // ========================================================================
    // Element invariants
    // ========================================================================
    #[error("unknown element kind '{kind}' (expected primitive, modifier or composite)")]
    UnknownElementKind { kind: String },

    #[error("element '{fqn}': field '{field}' {reason}")]
    InvalidElementField {
        fqn: String,
        field: &'static str,
        reason: String,
    },

    #[error("element '{fqn}' is a {kind} but declares {field}")]
    KindFieldMismatch {
        fqn: String,
        kind: &'static str,
        field: &'static str,
    },

    // ========================================================================
    // Composition graph
    // ========================================================================
    #[error("composite cycle in component '{component}': {}", .path.join(" -> "))]
    CompositeCycle {
        component: String,
        path: Vec<String>,
    },

    #[error(
        "conflicting definitions of '{fqn}' in component '{component}': {first} and {second} differ"
    )]
    ElementConflict {
        component: String,
        fqn: String,
        first: String,
        second: String,
    },

    #[error("component '{component}' still contains composite '{fqn}' after flattening")]
    NotFlattened { component: String, fqn: String },

    // ========================================================================
    // Provider invariants
    // ========================================================================
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    #[error("invalid transformer '{fqn}': {reason}")]
    InvalidTransformer { fqn: String, reason: String },

    // ========================================================================
    // Constraint Violations
    // ========================================================================
    #[error("Required field missing: {field}")]
    MissingRequiredField { field: &'static str },

    #[error("invalid {option} '{value}' (expected one of: {expected})")]
    InvalidOption {
        option: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl DomainError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::UnknownElementKind { kind } => vec![
                format!("'{kind}' is not an element kind"),
                "Use one of: primitive, modifier, composite".into(),
            ],
            Self::InvalidElementField { fqn, field, .. } => vec![
                format!("Check the '{field}' field of element '{fqn}'"),
                "Lists must contain only strings; labels must map strings to strings".into(),
            ],
            Self::KindFieldMismatch { field, .. } => vec![
                format!("Only composites may declare composes, only modifiers may declare modifies (found {field})"),
            ],
            Self::CompositeCycle { path, .. } => vec![
                format!("Break the cycle: {}", path.join(" -> ")),
                "A composite must not compose itself, directly or transitively".into(),
            ],
            Self::ElementConflict { fqn, .. } => vec![
                format!("Two composites expand to different definitions of '{fqn}'"),
                "Align the element versions, or use the last-write-wins collision policy".into(),
            ],
            Self::InvalidProvider(msg) => vec![
                "Check the provider definition".into(),
                format!("Details: {msg}"),
            ],
            Self::InvalidTransformer { fqn, .. } => vec![
                format!("Check transformer '{fqn}' in the provider"),
                "Every transformer needs a name, a #transform template and at least one declaration"
                    .into(),
            ],
            Self::InvalidOption { expected, .. } => vec![format!("Valid values: {expected}")],
            _ => vec!["See documentation for more details".into()],
        }
    }

    /// Error category for CLI display styling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownElementKind { .. }
            | Self::InvalidElementField { .. }
            | Self::KindFieldMismatch { .. }
            | Self::InvalidProvider(_)
            | Self::InvalidTransformer { .. }
            | Self::MissingRequiredField { .. }
            | Self::InvalidOption { .. } => ErrorCategory::Validation,
            Self::CompositeCycle { .. } | Self::ElementConflict { .. } => ErrorCategory::Conflict,
            Self::NotFlattened { .. } => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    NotFound,
    Internal,
}
