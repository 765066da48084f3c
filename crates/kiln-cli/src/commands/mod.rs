//! Command handlers, one module per subcommand.

use std::path::{Path, PathBuf};

use tracing::info;

use kiln_adapters::{FileProviderLoader, InMemoryElementRegistry, load_document};
use kiln_core::domain::Provider;

use crate::{
    config::AppConfig,
    error::{CliContext, CliError, CliResult},
};

pub mod config;
pub mod flatten;
pub mod provider;
pub mod render;

/// Load every catalog into one registry; later catalogs win.
pub(crate) fn load_registry(catalogs: &[PathBuf]) -> CliResult<InMemoryElementRegistry> {
    let registry = InMemoryElementRegistry::new();
    for path in catalogs {
        let catalog = load_document(path)?;
        let count = registry
            .load_catalog(catalog.as_ref())
            .cli_context(|| format!("loading element catalog {}", path.display()))?;
        info!(path = %path.display(), count, "Element catalog loaded");
    }
    Ok(registry)
}

/// The provider named on the command line, else `providers.path`.
pub(crate) fn load_provider(path: Option<&Path>, config: &AppConfig) -> CliResult<Provider> {
    let path = path
        .or(config.providers.path.as_deref())
        .ok_or(CliError::MissingProvider)?;
    let provider = FileProviderLoader::default().load(path)?;
    info!(provider = %provider, transformers = provider.transformers.len(), "Provider loaded");
    Ok(provider)
}
