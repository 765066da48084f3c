//! Application layer errors.
//!
//! These errors represent failures in orchestration: resolving, matching,
//! executing and loading. Pure invariant violations are `DomainError` from
//! `crate::domain`.

use std::fmt;
use thiserror::Error;

use crate::domain::Fqn;
use crate::error::ErrorCategory;

/// Which side of a transformer run failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    Input,
    Output,
}

impl fmt::Display for ValidationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Where provider or document loading failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Reading,
    Parsing,
    Extraction,
    Validation,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reading => "reading",
            Self::Parsing => "parsing",
            Self::Extraction => "extraction",
            Self::Validation => "validation",
        })
    }
}

/// Errors that occur during application orchestration.
#[derive(Debug, Error, Clone)]
pub enum ApplicationError {
    /// A directly listed element could not be resolved.
    #[error("cannot resolve element '{fqn}' in component '{component}': {reason}")]
    Resolution {
        component: String,
        fqn: Fqn,
        reason: String,
    },

    /// The raw component does not have the expected layout.
    #[error("component '{component}' is malformed: {reason}")]
    InvalidComponent { component: String, reason: String },

    /// Strict matching left elements without a transformer.
    #[error(
        "no transformer covers {} in component '{component}'",
        .unmatched.iter().map(|f| format!("'{f}'")).collect::<Vec<_>>().join(", ")
    )]
    Match { component: String, unmatched: Vec<Fqn> },

    /// Input or output validation failed for one transformer.
    #[error("{phase} validation failed for transformer '{transformer}' on component '{component}': {reason}")]
    Validation {
        component: String,
        transformer: Fqn,
        phase: ValidationPhase,
        reason: String,
    },

    /// The evaluation engine failed to expand a transform template.
    #[error("transformer '{transformer}' failed on component '{component}': {reason}")]
    Execution {
        component: String,
        transformer: Fqn,
        reason: String,
    },

    /// The transformer was cancelled by a fail-fast trigger.
    #[error("transformer '{transformer}' on component '{component}' was cancelled")]
    Cancelled { component: String, transformer: Fqn },

    /// A worker task died without reporting a result.
    #[error("execution task for component '{component}' failed: {reason}")]
    TaskFailed { component: String, reason: String },

    /// Several transformers failed for one component.
    #[error(
        "{} transformer(s) failed for component '{component}': {}",
        .failures.len(),
        .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    ExecutionFailed {
        component: String,
        failures: Vec<ApplicationError>,
    },

    /// Provider or document loading failed.
    #[error("failed to load {source_name} ({stage}): {reason}")]
    Load {
        stage: LoadStage,
        source_name: String,
        reason: String,
    },

    /// The module document is missing required structure.
    #[error("invalid module: {reason}")]
    InvalidModule { reason: String },

    /// Rendering produced nothing.
    #[error("module '{module}' rendered no resources")]
    NoResources { module: String },

    /// Registry access failed (lock poisoned, etc.).
    #[error("Element registry error")]
    RegistryLock,
}

impl ApplicationError {
    /// Get user-actionable suggestions.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Resolution { fqn, .. } => vec![
                format!("Check the definition of '{fqn}' under #elements"),
                "Every element needs a kind: primitive, modifier or composite".into(),
            ],
            Self::InvalidComponent { .. } => vec![
                "A component is a struct with optional #metadata and #elements fields".into(),
            ],
            Self::Match { unmatched, .. } => vec![
                format!("Unmatched: {}", join(unmatched)),
                "Use a provider with a transformer for these elements".into(),
                "Or drop --strict to render the covered subset".into(),
            ],
            Self::Validation { phase, transformer, .. } => match phase {
                ValidationPhase::Input => vec![
                    format!("The component is missing data required by '{transformer}'"),
                    "Run with --no-validate to skip validation".into(),
                ],
                ValidationPhase::Output => vec![
                    format!("'{transformer}' produced a resource without apiVersion, kind or metadata.name"),
                    "This is a provider issue; report it to the provider author".into(),
                ],
            },
            Self::Execution { transformer, .. } => vec![
                format!("Check the #transform template of '{transformer}'"),
                "Run with -vv for per-transformer detail".into(),
            ],
            Self::ExecutionFailed { failures, .. } => {
                failures.iter().flat_map(Self::suggestions).collect()
            }
            Self::Load { stage, source_name, .. } => match stage {
                LoadStage::Reading => vec![
                    format!("Failed to read: {source_name}"),
                    "Check that the path exists and is readable".into(),
                ],
                LoadStage::Parsing => vec![
                    "Supported formats: .json, .toml, .yaml".into(),
                    "Check the document syntax".into(),
                ],
                LoadStage::Extraction => vec![
                    "Define the provider under #Provider, #KubernetesProvider, or a struct with #kind: \"Provider\"".into(),
                ],
                LoadStage::Validation => vec![
                    "Every transformer needs metadata.name, #transform and at least one declaration".into(),
                ],
            },
            Self::InvalidModule { .. } => vec![
                "A module needs #metadata.name and a components struct".into(),
            ],
            Self::NoResources { .. } => vec![
                "No transformer produced output; check provider coverage with: kiln flatten".into(),
            ],
            Self::RegistryLock => vec![
                "The element registry is locked".into(),
                "Try again in a moment".into(),
            ],
            _ => vec!["Check the error details above".into()],
        }
    }

    /// Get error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Resolution { .. }
            | Self::InvalidComponent { .. }
            | Self::Validation { .. }
            | Self::InvalidModule { .. }
            | Self::NoResources { .. } => ErrorCategory::Validation,
            Self::Match { .. } => ErrorCategory::NotFound,
            Self::Execution { .. } | Self::Cancelled { .. } | Self::ExecutionFailed { .. } => {
                ErrorCategory::Execution
            }
            Self::Load { stage, .. } => match stage {
                LoadStage::Reading => ErrorCategory::NotFound,
                _ => ErrorCategory::Validation,
            },
            Self::TaskFailed { .. } | Self::RegistryLock => ErrorCategory::Internal,
        }
    }

    /// Pipeline stage the error originated in.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Resolution { .. } | Self::InvalidComponent { .. } => "flatten",
            Self::Match { .. } => "match",
            Self::Validation { phase, .. } => match phase {
                ValidationPhase::Input => "validate-input",
                ValidationPhase::Output => "validate-output",
            },
            Self::Execution { .. }
            | Self::Cancelled { .. }
            | Self::TaskFailed { .. }
            | Self::ExecutionFailed { .. } => "execute",
            Self::Load { .. } => "load",
            Self::InvalidModule { .. } | Self::NoResources { .. } => "render",
            Self::RegistryLock => "registry",
        }
    }
}

fn join(fqns: &[Fqn]) -> String {
    fqns.iter().map(Fqn::as_str).collect::<Vec<_>>().join(", ")
}
