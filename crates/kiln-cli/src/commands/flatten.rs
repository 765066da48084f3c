//! Implementation of the `kiln flatten` command.

use std::sync::Arc;

use kiln_adapters::load_document;
use kiln_core::application::{COMPONENTS_FIELD, FlattenOptions, Flattener};
use kiln_core::domain::Component;

use crate::{
    cli::FlattenArgs,
    commands::load_registry,
    error::{CliError, CliResult},
    output::OutputManager,
};

pub fn execute(args: FlattenArgs, output: OutputManager) -> CliResult<()> {
    let registry = load_registry(&args.elements)?;
    let module = load_document(&args.module)?;

    let components = module
        .lookup(COMPONENTS_FIELD)
        .ok_or_else(|| CliError::InvalidInput {
            message: format!(
                "{} has no '{COMPONENTS_FIELD}' field",
                args.module.display()
            ),
            source: None,
        })?;

    let flattener = Flattener::new(Arc::new(registry)).with_options(FlattenOptions {
        collision: args.flatten.collision.into(),
    });
    let flattened = flattener.flatten_module(components.as_ref())?;

    for component in &flattened {
        print_component(component, &output)?;
    }
    output.success(&format!("Flattened {} component(s)", flattened.len()))?;
    Ok(())
}

fn print_component(component: &Component, output: &OutputManager) -> CliResult<()> {
    output.header(&format!("Component {}", component.id))?;
    if !component.provenance.is_empty() {
        let composites: Vec<_> = component.provenance.iter().map(|f| f.as_str()).collect();
        output.detail("composites", &composites.join(", "))?;
    }

    let width = component
        .element_fqns()
        .map(|f| f.as_str().len())
        .max()
        .unwrap_or_default();
    for element in component.elements.values() {
        output.print(&format!(
            "  {:<width$}  {:<9}  {}  {}",
            element.fqn.as_str(),
            element.kind.to_string(),
            element.content_hash.short(),
            element.provenance,
        ))?;
    }

    for warning in &component.warnings {
        output.warning(&format!("{}: {warning}", component.id))?;
    }
    Ok(())
}
