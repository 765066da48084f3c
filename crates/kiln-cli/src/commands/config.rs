//! `kiln config` — inspect the effective configuration.

use crate::{
    cli::ConfigCommands,
    config::AppConfig,
    error::{CliError, CliResult},
    output::OutputManager,
};

/// Dispatch to the correct config subcommand.
pub fn execute(cmd: ConfigCommands, config: AppConfig, output: OutputManager) -> CliResult<()> {
    match cmd {
        ConfigCommands::Show => {
            let serialised =
                toml::to_string_pretty(&config).map_err(|e| CliError::Config {
                    message: format!("Failed to serialise config: {e}"),
                    source: Some(Box::new(e)),
                })?;
            output.document(&serialised)?;
        }

        ConfigCommands::Get { key } => {
            let value = get_config_value(&config, &key)?;
            output.document(&value)?;
        }

        ConfigCommands::Path => {
            output.document(&AppConfig::config_path().display().to_string())?;
        }
    }

    Ok(())
}

// ── helpers ───────────────────────────────────────────────────────────────────

fn get_config_value(config: &AppConfig, key: &str) -> CliResult<String> {
    let render = &config.render;
    let value = match key {
        "providers.path" => config
            .providers
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        "render.strategy" => render.strategy.clone(),
        "render.strict" => render.strict.to_string(),
        "render.parallel" => render.parallel.to_string(),
        "render.fail_fast" => render.fail_fast.to_string(),
        "render.validate_input" => render.validate_input.to_string(),
        "render.validate_output" => render.validate_output.to_string(),
        "render.max_workers" => render
            .max_workers
            .map(|n| n.to_string())
            .unwrap_or_default(),
        "render.namespace" => render.namespace.clone(),
        "output.no_color" => config.output.no_color.to_string(),
        "output.format" => config.output.format.clone(),
        "log.level" => config.log.level.clone(),
        "log.format" => config.log.format.clone(),
        _ => {
            return Err(CliError::Config {
                message: format!("Unknown config key: '{key}'"),
                source: None,
            });
        }
    };
    Ok(value)
}

// ── tests ─────────────────────────────────────────────────────────────────────
