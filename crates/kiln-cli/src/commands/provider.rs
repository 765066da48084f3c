//! Implementation of the `kiln provider` command.

use kiln_core::domain::Provider;

use crate::{
    cli::ProviderArgs, commands::load_provider, config::AppConfig, error::CliResult,
    output::OutputManager,
};

pub fn execute(args: ProviderArgs, config: AppConfig, output: OutputManager) -> CliResult<()> {
    let provider = load_provider(args.path.as_deref(), &config)?;
    print_provider(&provider, &output)?;
    Ok(())
}

fn print_provider(provider: &Provider, output: &OutputManager) -> CliResult<()> {
    let metadata = &provider.metadata;
    output.header(&format!("Provider {provider}"))?;
    if !metadata.description.is_empty() {
        output.detail("description", &metadata.description)?;
    }
    if !metadata.min_version.is_empty() {
        output.detail("min version", &metadata.min_version)?;
    }
    if let Some(hash) = &provider.hash {
        output.detail("hash", short(hash))?;
    }
    for (key, value) in &metadata.labels {
        output.detail("label", &format!("{key}={value}"))?;
    }

    output.print("")?;
    output.header(&format!("Transformers ({})", provider.transformers.len()))?;
    for (fqn, transformer) in &provider.transformers {
        output.print(&format!("  {fqn}"))?;
        if !transformer.metadata.description.is_empty() {
            output.detail("description", &transformer.metadata.description)?;
        }
        for (label, items) in [
            ("resources", &transformer.resources),
            ("traits", &transformer.traits),
            ("policies", &transformer.policies),
        ] {
            if !items.is_empty() {
                output.detail(label, &items.join(", "))?;
            }
        }
        if let Some(hash) = &transformer.hash {
            output.detail("hash", short(hash))?;
        }
    }

    output.print("")?;
    output.header("Declared")?;
    for (label, items) in [
        ("resources", &provider.declared_resources),
        ("traits", &provider.declared_traits),
        ("policies", &provider.declared_policies),
    ] {
        let value = if items.is_empty() {
            "-".to_owned()
        } else {
            items.join(", ")
        };
        output.detail(label, &value)?;
    }
    Ok(())
}

/// Display form of a full hex digest.
fn short(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_truncates_to_sixteen() {
        let full = "a".repeat(64);
        assert_eq!(short(&full).len(), 16);
        assert_eq!(short("abc"), "abc");
    }
}
