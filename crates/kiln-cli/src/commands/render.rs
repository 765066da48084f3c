//! Implementation of the `kiln render` command.

use std::fs;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use kiln_adapters::{TemplateEngine, load_document};
use kiln_core::application::{RenderOptions, RenderReport, RenderService};
use kiln_core::domain::SharedValue;

use crate::{
    cli::{RenderArgs, ResourceFormat},
    commands::{load_provider, load_registry},
    config::AppConfig,
    error::{CliContext, CliError, CliResult},
    output::OutputManager,
};

#[instrument(skip_all, fields(module = %args.module.display()))]
pub async fn execute(args: RenderArgs, config: AppConfig, output: OutputManager) -> CliResult<()> {
    let options = render_options(&args, &config)?;
    let format = args.format.unwrap_or_else(|| config.resource_format());

    let provider = load_provider(args.provider.as_deref(), &config)?;
    let registry = load_registry(&args.elements)?;
    let module = load_document(&args.module)?;

    let service = RenderService::new(
        Arc::new(provider),
        Arc::new(registry),
        Arc::new(TemplateEngine::new()),
        options,
    );
    let report = service.render_module(module.as_ref()).await?;
    info!(run_id = %report.run_id, resources = report.resources.len(), "Render finished");

    for (component, warning) in report.warnings() {
        output.warning(&format!("{component}: {warning}"))?;
    }
    for component in &report.components {
        for fqn in &component.unmatched {
            output.warning(&format!("{}: no transformer covers '{fqn}'", component.component_id))?;
        }
    }
    for failure in &report.failures {
        output.error(&failure.to_string())?;
    }

    if args.dry_run {
        print_plan(&report, &output)?;
    } else {
        let text = serialize(&report.resources, format)?;
        match &args.output {
            Some(path) => {
                fs::write(path, &text).cli_context(|| format!("writing {}", path.display()))?;
                output.info(&format!("Wrote {}", path.display()))?;
            }
            None => output.document(&text)?,
        }
    }

    output.success(&format!(
        "Rendered {} resource(s) from {} component(s) of {}@{} with {}",
        report.resources.len(),
        report.components.len(),
        report.module_name,
        report.module_version,
        report.provider,
    ))?;

    if !report.is_success() {
        return Err(CliError::RenderIncomplete {
            module: report.module_name.clone(),
            failures: report.failures.len(),
        });
    }
    Ok(())
}

/// Configured options with command-line overrides applied.
fn render_options(args: &RenderArgs, config: &AppConfig) -> CliResult<RenderOptions> {
    let mut options = config.render_options()?;
    if let Some(namespace) = &args.namespace {
        if namespace.trim().is_empty() {
            return Err(CliError::InvalidInput {
                message: "--namespace must not be empty".into(),
                source: None,
            });
        }
        options.namespace = namespace.clone();
    }
    if let Some(strategy) = args.strategy {
        options.matching.strategy = strategy.into();
    }
    if args.strict {
        options.matching.strict = true;
    }
    if args.sequential {
        options.execution.parallel = false;
    }
    if args.keep_going {
        options.execution.fail_fast = false;
    }
    if args.no_validate {
        options.execution.validate_input = false;
        options.execution.validate_output = false;
    }
    options.flatten.collision = args.flatten.collision.into();
    Ok(options)
}

fn print_plan(report: &RenderReport, output: &OutputManager) -> CliResult<()> {
    output.header(&format!(
        "Render plan for {}@{} (run {})",
        report.module_name, report.module_version, report.run_id
    ))?;
    for component in &report.components {
        output.print(&format!("  {}", component.component_id))?;
        if component.results.is_empty() {
            output.print("    (no transformers matched)")?;
        }
        for result in &component.results {
            output.print(&format!(
                "    {} -> {} resource(s)",
                result.transformer_fqn, result.resource_count
            ))?;
        }
    }
    output.print(&format!("{} resource(s) would be written", report.resources.len()))?;
    Ok(())
}

/// A JSON array, or a YAML stream with one document per resource.
fn serialize(resources: &[SharedValue], format: ResourceFormat) -> CliResult<String> {
    let values = resources
        .iter()
        .map(|r| r.to_canonical())
        .collect::<Result<Vec<Value>, _>>()
        .map_err(|e| CliError::Output {
            format: "resource",
            message: e.to_string(),
        })?;

    match format {
        ResourceFormat::Json => serde_json::to_string_pretty(&values)
            .map(|mut text| {
                text.push('\n');
                text
            })
            .map_err(|e| CliError::Output {
                format: "json",
                message: e.to_string(),
            }),
        ResourceFormat::Yaml => {
            let mut text = String::new();
            for value in &values {
                let doc = serde_yaml::to_string(value).map_err(|e| CliError::Output {
                    format: "yaml",
                    message: e.to_string(),
                })?;
                text.push_str("---\n");
                text.push_str(&doc);
            }
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use kiln_adapters::JsonValue;
    use kiln_core::domain::{CollisionPolicy, MatchStrategy};
    use serde_json::json;

    fn parse(extra: &[&str]) -> RenderArgs {
        let mut argv = vec!["kiln", "render", "m.json"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Render(args) => args,
            _ => panic!("expected Render command"),
        }
    }

    #[test]
    fn flags_override_configuration() {
        let mut config = AppConfig::default();
        config.render.namespace = "staging".into();
        config.render.strategy = "all".into();

        let options = render_options(
            &parse(&[
                "--namespace",
                "prod",
                "--strategy",
                "best",
                "--strict",
                "--sequential",
                "--keep-going",
                "--no-validate",
                "--collision",
                "require-identical",
            ]),
            &config,
        )
        .unwrap();

        assert_eq!(options.namespace, "prod");
        assert_eq!(options.matching.strategy, MatchStrategy::Best);
        assert!(options.matching.strict);
        assert!(!options.execution.parallel);
        assert!(!options.execution.fail_fast);
        assert!(!options.execution.validate_input);
        assert!(!options.execution.validate_output);
        assert_eq!(options.flatten.collision, CollisionPolicy::RequireIdentical);
    }

    #[test]
    fn configuration_applies_without_flags() {
        let mut config = AppConfig::default();
        config.render.namespace = "staging".into();
        config.render.fail_fast = false;

        let options = render_options(&parse(&[]), &config).unwrap();
        assert_eq!(options.namespace, "staging");
        assert!(!options.execution.fail_fast);
        assert!(options.execution.parallel);
    }

    #[test]
    fn blank_namespace_is_rejected() {
        let err = render_options(&parse(&["--namespace", " "]), &AppConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn yaml_output_is_a_document_stream() {
        let resources = vec![
            JsonValue::shared(json!({"kind": "Deployment", "metadata": {"name": "api"}})),
            JsonValue::shared(json!({"kind": "Service", "metadata": {"name": "api"}})),
        ];
        let text = serialize(&resources, ResourceFormat::Yaml).unwrap();
        assert_eq!(text.matches("---\n").count(), 2);
        assert!(text.contains("kind: Deployment"));
        assert!(text.find("Deployment").unwrap() < text.find("Service").unwrap());
    }

    #[test]
    fn json_output_is_an_array() {
        let resources = vec![JsonValue::shared(json!({"kind": "Deployment"}))];
        let text = serialize(&resources, ResourceFormat::Json).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([{"kind": "Deployment"}]));
        assert!(serialize(&[], ResourceFormat::Json).unwrap().starts_with("[]"));
    }
}
