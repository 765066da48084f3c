//! Application configuration.
//!
//! [`AppConfig`] is loaded once at startup and passed down by value.  The
//! CLI layer owns config; the core crate never sees it.
//!
//! # Resolution order (highest priority first)
//!
//! 1. CLI flags (applied at the call-site, not here)
//! 2. Environment variables: `KILN_<SECTION>__<KEY>`, e.g. `KILN_RENDER__NAMESPACE`
//! 3. Config file (`--config`, else the platform config directory)
//! 4. Built-in defaults (always present)

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use kiln_core::application::{ExecutionOptions, MatchOptions, RenderOptions};
use kiln_core::domain::MatchStrategy;

use crate::cli::ResourceFormat;
use crate::error::{CliError, CliResult};

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub render: RenderConfig,
    pub output: OutputConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider used when `--provider` is not given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub strategy: String,
    pub strict: bool,
    pub parallel: bool,
    pub fail_fast: bool,
    pub validate_input: bool,
    pub validate_output: bool,
    /// Unset means one worker per transformer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    pub namespace: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let execution = ExecutionOptions::default();
        Self {
            strategy: MatchStrategy::default().to_string(),
            strict: false,
            parallel: execution.parallel,
            fail_fast: execution.fail_fast,
            validate_input: execution.validate_input,
            validate_output: execution.validate_output,
            max_workers: None,
            namespace: RenderOptions::default().namespace,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub no_color: bool,
    /// Default resource format for `render`.
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            no_color: false,
            format: ResourceFormat::default().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level used when neither `RUST_LOG` nor `-v`/`-q` is given.
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "pretty".into(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// An explicit `config_file` must exist; the default location is optional.
    pub fn load(config_file: Option<&PathBuf>) -> CliResult<Self> {
        let (path, required) = match config_file {
            Some(path) => (path.clone(), true),
            None => (Self::config_path(), false),
        };
        Self::load_from(&path, required)
    }

    fn load_from(path: &Path, required: bool) -> CliResult<Self> {
        if required && !path.is_file() {
            return Err(CliError::Config {
                message: format!("config file not found: {}", path.display()),
                source: None,
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&Self::default()).map_err(config_error)?)
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix("KILN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;

        let loaded: Self = config.try_deserialize().map_err(config_error)?;
        loaded.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(loaded)
    }

    /// Reject values the render pipeline cannot use.
    pub fn validate(&self) -> CliResult<()> {
        let invalid = |key: &str, value: &str, expected: &str| CliError::Config {
            message: format!("invalid {key} '{value}' (expected one of: {expected})"),
            source: None,
        };

        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(invalid("log.level", &self.log.level, &LOG_LEVELS.join(", ")));
        }
        if !LOG_FORMATS.contains(&self.log.format.to_ascii_lowercase().as_str()) {
            return Err(invalid("log.format", &self.log.format, &LOG_FORMATS.join(", ")));
        }
        if ResourceFormat::parse(&self.output.format).is_none() {
            return Err(invalid("output.format", &self.output.format, "json, yaml"));
        }
        if self.render.strategy.parse::<MatchStrategy>().is_err() {
            return Err(invalid("render.strategy", &self.render.strategy, "all, best"));
        }
        if self.render.max_workers == Some(0) {
            return Err(CliError::Config {
                message: "render.max_workers must be at least 1".into(),
                source: None,
            });
        }
        Ok(())
    }

    /// Render options before CLI flag overrides.
    pub fn render_options(&self) -> CliResult<RenderOptions> {
        let strategy = self
            .render
            .strategy
            .parse::<MatchStrategy>()
            .map_err(|e| CliError::Config {
                message: e.to_string(),
                source: None,
            })?;

        Ok(RenderOptions {
            namespace: self.render.namespace.clone(),
            matching: MatchOptions {
                strategy,
                strict: self.render.strict,
            },
            execution: ExecutionOptions {
                parallel: self.render.parallel,
                fail_fast: self.render.fail_fast,
                validate_input: self.render.validate_input,
                validate_output: self.render.validate_output,
                max_workers: self.render.max_workers.and_then(NonZeroUsize::new),
            },
            ..Default::default()
        })
    }

    /// Default resource format for `render`.
    pub fn resource_format(&self) -> ResourceFormat {
        ResourceFormat::parse(&self.output.format).unwrap_or_default()
    }

    /// Path to the default configuration file.
    ///
    /// Uses `directories::ProjectDirs` for cross-platform correctness,
    /// falling back to `.kiln.toml` in the current directory.
    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("dev", "kiln", "kiln")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".kiln.toml"))
    }
}

fn config_error(err: config::ConfigError) -> CliError {
    CliError::Config {
        message: err.to_string(),
        source: Some(Box::new(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kiln.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_match_pipeline_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.render.namespace, "default");
        assert_eq!(cfg.render.strategy, "best");
        assert!(cfg.render.parallel);
        assert!(cfg.render.fail_fast);
        assert!(cfg.validate().is_ok());

        let options = cfg.render_options().unwrap();
        assert_eq!(options, RenderOptions::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let (_dir, path) = write_config(
            r#"
[render]
namespace = "staging"
strategy = "all"
max_workers = 4

[output]
format = "yaml"
"#,
        );
        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.render.namespace, "staging");
        assert_eq!(cfg.resource_format(), ResourceFormat::Yaml);
        // untouched keys keep their defaults
        assert!(cfg.render.fail_fast);

        let options = cfg.render_options().unwrap();
        assert_eq!(options.matching.strategy, MatchStrategy::All);
        assert_eq!(options.execution.max_workers, NonZeroUsize::new(4));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn zero_workers_rejected() {
        let (_dir, path) = write_config("[render]\nmax_workers = 0\n");
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(CliError::Config { .. })
        ));
    }

    #[test]
    fn unknown_log_level_rejected() {
        let mut cfg = AppConfig::default();
        cfg.log.level = "loud".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("log.level"));
    }

    #[test]
    fn unknown_strategy_rejected() {
        let mut cfg = AppConfig::default();
        cfg.render.strategy = "first".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_path_is_not_empty() {
        let p = AppConfig::config_path();
        assert!(!p.as_os_str().is_empty());
    }
}
