//! Provider Loader - builds [`Provider`] records from structured values.
//!
//! The loader never touches files; `kiln-adapters` reads documents and
//! hands the evaluated value over.
//!
//! ## Lookup order
//!
//! 1. `#Provider`
//! 2. `#KubernetesProvider`
//! 3. the first nested struct with `#kind: "Provider"`, depth-first

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::{
    application::{ApplicationError, error::LoadStage, services::extract},
    domain::{
        ContentHasher, DomainValidator as validator, Fqn, Provider, ProviderMetadata,
        SharedValue, StructuredValue, Transformer, TransformerMetadata, ValueError,
    },
    error::KilnResult,
};

const PROVIDER_FIELDS: [&str; 2] = ["#Provider", "#KubernetesProvider"];
const KIND_FIELD: &str = "#kind";
const PROVIDER_KIND: &str = "Provider";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Compute SHA-256 identity hashes for transformers and the provider.
    pub compute_hashes: bool,
    /// Run domain validation after extraction.
    pub validate_on_load: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            compute_hashes: true,
            validate_on_load: true,
        }
    }
}

/// Builds providers from evaluated values.
#[derive(Debug, Clone, Default)]
pub struct ProviderLoader {
    options: LoadOptions,
}

impl ProviderLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    /// Build a provider from an evaluated value.
    pub fn load_from_value(&self, value: SharedValue) -> KilnResult<Provider> {
        self.load("value", value)
    }

    /// Build a provider, naming `source_name` in any error.
    ///
    /// # Errors
    ///
    /// `ApplicationError::Load` at the `Extraction` stage when no provider
    /// definition is found or a field has the wrong shape, and at the
    /// `Validation` stage when `validate_on_load` rejects the result.
    #[instrument(skip_all, fields(source = %source_name))]
    pub fn load(&self, source_name: &str, value: SharedValue) -> KilnResult<Provider> {
        let fail = |stage: LoadStage, reason: String| ApplicationError::Load {
            stage,
            source_name: source_name.to_owned(),
            reason,
        };

        let definition = find_provider(value.as_ref()).ok_or_else(|| {
            fail(
                LoadStage::Extraction,
                "no #Provider, #KubernetesProvider or #kind: \"Provider\" definition found".into(),
            )
        })?;

        let metadata = definition
            .lookup("metadata")
            .ok_or_else(|| fail(LoadStage::Extraction, "provider metadata is required".into()))?;
        let metadata = provider_metadata(metadata.as_ref())
            .map_err(|e| fail(LoadStage::Extraction, format!("metadata: {e}")))?;

        let mut provider = Provider::new(metadata);
        provider.schema = Some(Arc::clone(&definition));

        if let Some(transformers) = definition.lookup("transformers") {
            let entries = transformers
                .fields()
                .map_err(|e| fail(LoadStage::Extraction, format!("transformers: {e}")))?;
            for (key, raw) in entries {
                let fqn = Fqn::from(key);
                let mut transformer = extract_transformer(&fqn, raw).map_err(|reason| {
                    fail(LoadStage::Extraction, format!("transformer '{fqn}': {reason}"))
                })?;
                if self.options.compute_hashes {
                    transformer.hash = Some(transformer_hash(&transformer));
                }
                debug!(fqn = %fqn, declarations = transformer.declarations().count(), "Loaded transformer");
                provider
                    .transformers
                    .insert(fqn, Arc::new(transformer));
            }
        }
        provider.compute_declared();

        if self.options.compute_hashes {
            provider.hash = Some(provider_hash(&provider));
        }

        if self.options.validate_on_load {
            validator::validate_provider(&provider)
                .map_err(|e| fail(LoadStage::Validation, e.to_string()))?;
        }

        info!(
            provider = %provider,
            transformers = provider.transformers.len(),
            resources = provider.declared_resources.len(),
            traits = provider.declared_traits.len(),
            policies = provider.declared_policies.len(),
            "Provider loaded"
        );
        Ok(provider)
    }
}

/// Locate the provider definition inside `value`.
fn find_provider(value: &dyn StructuredValue) -> Option<SharedValue> {
    PROVIDER_FIELDS
        .iter()
        .find_map(|field| value.lookup(field))
        .or_else(|| find_by_kind(value))
}

fn find_by_kind(value: &dyn StructuredValue) -> Option<SharedValue> {
    let fields = value.fields().ok()?;
    for (_, child) in fields {
        if is_provider_kind(child.as_ref()) {
            return Some(child);
        }
        if let Some(found) = find_by_kind(child.as_ref()) {
            return Some(found);
        }
    }
    None
}

fn is_provider_kind(value: &dyn StructuredValue) -> bool {
    matches!(extract::string(value, KIND_FIELD), Ok(Some(kind)) if kind == PROVIDER_KIND)
}

fn provider_metadata(raw: &dyn StructuredValue) -> Result<ProviderMetadata, ValueError> {
    Ok(ProviderMetadata {
        name: extract::string_or_default(raw, "name")?,
        version: extract::string_or_default(raw, "version")?,
        min_version: extract::string_or_default(raw, "minVersion")?,
        description: extract::string_or_default(raw, "description")?,
        labels: extract::string_map(raw, "labels")?,
        annotations: extract::string_map(raw, "annotations")?,
    })
}

fn extract_transformer(fqn: &Fqn, raw: SharedValue) -> Result<Transformer, String> {
    let metadata = raw
        .lookup("metadata")
        .ok_or_else(|| "metadata is required".to_owned())?;

    let metadata = TransformerMetadata {
        fqn: fqn.clone(),
        name: extract::string_or_default(metadata.as_ref(), "name").map_err(field("metadata.name"))?,
        api_version: extract::string_or_default(metadata.as_ref(), "apiVersion")
            .map_err(field("metadata.apiVersion"))?,
        description: extract::string_or_default(metadata.as_ref(), "description")
            .map_err(field("metadata.description"))?,
        labels: extract::string_map(metadata.as_ref(), "labels").map_err(field("metadata.labels"))?,
        annotations: extract::string_map(metadata.as_ref(), "annotations")
            .map_err(field("metadata.annotations"))?,
    };

    let mut transformer = Transformer::new(metadata);
    transformer.resources = extract::string_list(raw.as_ref(), "resources").map_err(field("resources"))?;
    transformer.traits = extract::string_list(raw.as_ref(), "traits").map_err(field("traits"))?;
    transformer.policies = extract::string_list(raw.as_ref(), "policies").map_err(field("policies"))?;
    transformer.transform = raw.lookup("#transform");
    transformer.schema = Some(raw);
    Ok(transformer)
}

fn field(name: &'static str) -> impl Fn(ValueError) -> String {
    move |e| format!("{name}: {e}")
}

/// SHA-256 over the transformer's identity fields.
fn transformer_hash(transformer: &Transformer) -> String {
    ContentHasher::new()
        .part(transformer.fqn().as_str())
        .part(&transformer.metadata.name)
        .part(&transformer.metadata.api_version)
        .part(transformer.resources.len().to_string())
        .parts(&transformer.resources)
        .part(transformer.traits.len().to_string())
        .parts(&transformer.traits)
        .part(transformer.policies.len().to_string())
        .parts(&transformer.policies)
        .finish()
        .to_hex()
}

/// SHA-256 over provider metadata and every transformer hash, FQN order.
fn provider_hash(provider: &Provider) -> String {
    provider
        .transformers
        .iter()
        .fold(
            ContentHasher::new()
                .part(&provider.metadata.name)
                .part(&provider.metadata.version)
                .part(&provider.metadata.description),
            |hasher, (fqn, transformer)| {
                hasher
                    .part(fqn.as_str())
                    .part(transformer.hash.as_deref().unwrap_or_default())
            },
        )
        .finish()
        .to_hex()
}
