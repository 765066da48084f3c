//! File loading for providers, modules and element catalogs.
//!
//! Documents are `.json`, `.toml`, `.yaml` or `.yml` files. A directory is
//! read as one document: its files (not subdirectories) are merged in file
//! name order, and two files setting the same scalar to different values is
//! an error.
//!
//! ```text
//! providers/kubernetes/
//! ├── provider.toml          ← #Provider.metadata
//! ├── deployment.json        ← #Provider.transformers."k8s.io/v1.Deployment"
//! └── service.yaml           ← #Provider.transformers."k8s.io/v1.Service"
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use kiln_core::{
    application::{ApplicationError, LoadOptions, LoadStage, ProviderLoader},
    domain::{Provider, SharedValue},
    error::KilnResult,
};

use crate::value::JsonValue;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
    Yaml,
}

impl DocumentFormat {
    /// Format implied by a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Parse `text` into the serde data model.
    pub fn parse(self, text: &str) -> Result<Value, String> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

fn load_error(stage: LoadStage, path: &Path, reason: impl Into<String>) -> ApplicationError {
    ApplicationError::Load {
        stage,
        source_name: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Load a file, or a directory of files merged into one document.
#[instrument(fields(path = %path.display()))]
pub fn load_document(path: &Path) -> KilnResult<SharedValue> {
    Ok(JsonValue::shared(read_tree(path)?))
}

fn read_tree(path: &Path) -> KilnResult<Value> {
    if !path.exists() {
        return Err(load_error(LoadStage::Reading, path, "path not found").into());
    }
    if !path.is_dir() {
        return read_file(path);
    }

    let mut merged = Value::Object(Default::default());
    let mut files = 0;
    for file in document_files(path, 1)? {
        let value = read_file(&file)?;
        merge(&mut merged, value, &mut Vec::new())
            .map_err(|reason| load_error(LoadStage::Parsing, &file, reason))?;
        files += 1;
    }
    if files == 0 {
        return Err(load_error(LoadStage::Reading, path, "no .json, .toml or .yaml files").into());
    }
    debug!(files, "Merged directory documents");
    Ok(merged)
}

fn read_file(path: &Path) -> KilnResult<Value> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        load_error(LoadStage::Reading, path, "unsupported extension (expected .json, .toml or .yaml)")
    })?;
    let raw = fs::read_to_string(path)
        .map_err(|e| load_error(LoadStage::Reading, path, e.to_string()))?;
    let value = format
        .parse(&raw)
        .map_err(|reason| load_error(LoadStage::Parsing, path, reason))?;
    debug!(path = %path.display(), ?format, "Parsed document");
    Ok(value)
}

/// Supported files under `dir`, sorted by path.
fn document_files(dir: &Path, max_depth: usize) -> KilnResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth).sort_by_file_name() {
        let entry = entry.map_err(|e| load_error(LoadStage::Reading, dir, e.to_string()))?;
        if entry.file_type().is_file() && DocumentFormat::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Deep-merge `from` into `into`.
fn merge(into: &mut Value, from: Value, path: &mut Vec<String>) -> Result<(), String> {
    match (into, from) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                path.push(key.clone());
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value, path)?,
                    None => {
                        target.insert(key, value);
                    }
                }
                path.pop();
            }
            Ok(())
        }
        (existing, value) if *existing == value => Ok(()),
        (_, _) => Err(format!("conflicting values for '{}'", path.join("."))),
    }
}

/// Loads providers from files and directories.
#[derive(Debug, Clone, Default)]
pub struct FileProviderLoader {
    loader: ProviderLoader,
}

impl FileProviderLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            loader: ProviderLoader::new(options),
        }
    }

    /// Load one provider from a file or a directory document.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load(&self, path: &Path) -> KilnResult<Provider> {
        let value = load_document(path)?;
        self.loader.load(&path.display().to_string(), value)
    }

    /// Load every provider file found under `dir`, recursively.
    ///
    /// Files that do not hold a provider are skipped; finding none at all is
    /// an error.
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub fn load_all(&self, dir: &Path) -> KilnResult<Vec<Provider>> {
        if !dir.is_dir() {
            return Err(load_error(LoadStage::Reading, dir, "not a directory").into());
        }

        let mut providers = Vec::new();
        for file in document_files(dir, usize::MAX)? {
            match self.load(&file) {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "Skipping file that is not a provider");
                }
            }
        }

        if providers.is_empty() {
            return Err(load_error(LoadStage::Reading, dir, "no providers found").into());
        }
        Ok(providers)
    }
}
