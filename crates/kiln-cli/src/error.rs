//! [`CliError`]: everything a command can fail with, plus the suggestions,
//! pipeline stage and exit code shown for it.

use std::error::Error;

use owo_colors::{OwoColorize, Style};
use thiserror::Error;

use kiln_core::error::{ErrorCategory as CoreCategory, KilnError, KilnResult};

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input that clap could not catch.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No provider on the command line or in the configuration.
    #[error("No provider given")]
    MissingProvider,

    /// A configuration file could not be read, parsed, or validated.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Anything raised by the pipeline or the file adapters.
    #[error("{0}")]
    Core(#[from] KilnError),

    /// `--keep-going` rendered what it could but some transformers failed.
    #[error("{failures} transformer(s) failed while rendering module '{module}'")]
    RenderIncomplete { module: String, failures: usize },

    /// Rendered resources could not be serialized.
    #[error("Failed to write {format} output: {message}")]
    Output {
        format: &'static str,
        message: String,
    },

    /// Writing output failed.
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl CliError {
    /// Hints printed under the error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidInput { message, .. } => vec![
                format!("Check your input: {message}"),
                "Use --help for usage information".into(),
            ],

            Self::MissingProvider => vec![
                "Pass a provider file or directory: kiln render <MODULE> --provider <PATH>".into(),
                "Or set providers.path in the config file".into(),
                "Or export KILN_PROVIDERS__PATH=<PATH>".into(),
            ],

            Self::Config { message, .. } => vec![
                format!("Configuration issue: {message}"),
                format!(
                    "Check your config file at {}",
                    crate::config::AppConfig::config_path().display()
                ),
                "Show the effective configuration with: kiln config show".into(),
            ],

            Self::Core(core_err) => core_err.suggestions(),

            Self::RenderIncomplete { .. } => vec![
                "The failures are listed above".into(),
                "Drop --keep-going to stop at the first failure".into(),
            ],

            Self::Output { .. } => vec![
                "A transformer produced a value the output format cannot represent".into(),
                "Try the other format with --format json or --format yaml".into(),
            ],

            Self::Io { message, .. } => vec![
                format!("I/O operation failed: {message}"),
                "Check that the output directory exists and is writable".into(),
            ],
        }
    }

    pub fn class(&self) -> ExitClass {
        match self {
            Self::InvalidInput { .. } | Self::MissingProvider => ExitClass::UserError,
            Self::Config { .. } => ExitClass::Configuration,
            Self::Core(core) => match core.category() {
                CoreCategory::Validation | CoreCategory::Conflict | CoreCategory::Execution => {
                    ExitClass::UserError
                }
                CoreCategory::NotFound => ExitClass::NotFound,
                CoreCategory::Configuration => ExitClass::Configuration,
                CoreCategory::Internal => ExitClass::Internal,
            },
            Self::RenderIncomplete { .. } => ExitClass::UserError,
            Self::Output { .. } | Self::Io { .. } => ExitClass::Internal,
        }
    }

    /// Pipeline stage of a core error.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Core(core) => core.stage(),
            Self::RenderIncomplete { .. } => Some("execute"),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.class() as u8
    }

    fn headline(&self) -> String {
        match self.stage() {
            Some(stage) => format!("[{stage}] {self}"),
            None => self.to_string(),
        }
    }

    /// Multi-line report for stderr: headline, cause chain when `verbose`,
    /// then suggestions.
    pub fn format(&self, verbose: bool, color: bool) -> String {
        let paint = |text: &str, style: Style| {
            if color {
                text.style(style).to_string()
            } else {
                text.to_owned()
            }
        };

        let mut out = format!(
            "\n{} {}\n",
            paint("\u{2717} Error:", Style::new().red().bold()),
            paint(&self.headline(), Style::new().red()),
        );

        if verbose {
            let mut cause = self.source();
            while let Some(err) = cause {
                out.push_str(&format!("  {} {err}\n", paint("caused by:", Style::new().dimmed())));
                cause = err.source();
            }
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str(&format!("\n{}\n", paint("Suggestions:", Style::new().yellow().bold())));
            for suggestion in &suggestions {
                out.push_str(&format!("  {suggestion}\n"));
            }
        }

        if !verbose {
            out.push_str(&format!(
                "\n{}\n",
                paint("Use -v / --verbose for more details.", Style::new().dimmed())
            ));
        }
        out
    }

    /// Emit the error as a tracing event before it is printed.
    pub fn log(&self) {
        let stage = self.stage().unwrap_or("cli");
        match self.class() {
            ExitClass::UserError => tracing::warn!(stage, "User error: {}", self),
            ExitClass::NotFound => tracing::warn!(stage, "Not found: {}", self),
            ExitClass::Configuration => tracing::error!(stage, "Configuration error: {}", self),
            ExitClass::Internal => tracing::error!(stage, "Internal error: {}", self),
        }

        if let Some(cause) = self.source() {
            tracing::debug!(%cause, "Underlying error");
        }
    }
}

/// How an error maps onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitClass {
    Internal = 1,
    /// Bad arguments, module or provider content.
    UserError = 2,
    /// A file that does not exist, or an element nothing covers.
    NotFound = 3,
    Configuration = 4,
}

// ── CliContext ────────────────────────────────────────────────────────────────

/// `.cli_context(|| "writing out.yaml")` at call sites that leave the core.
pub trait CliContext<T> {
    fn cli_context<F, S>(self, what: F) -> CliResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> CliContext<T> for Result<T, std::io::Error> {
    fn cli_context<F, S>(self, what: F) -> CliResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| CliError::Io {
            message: format!("{}: {e}", what().into()),
            source: e,
        })
    }
}

impl<T> CliContext<T> for KilnResult<T> {
    // Core errors already name the element, transformer or file involved,
    // so the context is only logged.
    fn cli_context<F, S>(self, what: F) -> CliResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| {
            tracing::debug!(context = %what().into(), "Core error");
            CliError::Core(e)
        })
    }
}
