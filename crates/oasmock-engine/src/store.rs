//! Named OpenAPI documents ("services"), in registration order
//!
//! Documents are validated when registered: a dynamic path template whose
//! placeholders are not all described by path parameters makes the whole
//! document invalid, before any request is matched against it.

use std::path::{Path, PathBuf};

use oasmock_core::{Config, Method};
use serde_json::Value;

use crate::matcher::operation;
use crate::matcher::path::{self, PathError};

/// File names that mark a directory as a single service.
const INDEX_FILES: [&str; 6] = [
    "index.yaml",
    "index.yml",
    "index.json",
    "openapi.yaml",
    "openapi.yml",
    "openapi.json",
];

/// A registered document.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub document: Value,
}

/// Holds named, immutable documents. Iteration follows registration order.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    services: Vec<Service>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under `name`.
    ///
    /// # Errors
    ///
    /// Returns error if the name is taken or a path template is malformed.
    pub fn register(&mut self, name: &str, document: Value) -> Result<(), StoreError> {
        if self.get(name).is_some() {
            return Err(StoreError::DuplicateService(name.to_string()));
        }
        validate_paths(&document).map_err(|source| StoreError::MalformedPathDeclaration {
            service: name.to_string(),
            source,
        })?;
        tracing::info!(service = %name, paths = path_count(&document), "registered service");
        self.services.push(Service {
            name: name.to_string(),
            document,
        });
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.iter()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Load every location listed in the config.
    ///
    /// # Errors
    ///
    /// Returns the first load or registration error.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for location in &config.services {
            store.load(location)?;
        }
        Ok(store)
    }

    /// Load a single document file, or every service inside a directory.
    ///
    /// Inside a directory, each `*.yaml|*.yml|*.json` file is a service named
    /// after its stem, and each subdirectory holding an index file
    /// (`index.yaml`, `openapi.json`, ...) is a service named after the
    /// directory. Entries are registered in file-name order.
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure, unparseable documents, or registration errors.
    pub fn load(&mut self, location: &Path) -> Result<(), StoreError> {
        if location.is_file() {
            let (name, document) = load_file(location)?;
            return self.register(&name, document);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(location)
            .map_err(|e| StoreError::Io(format!("{}: {e}", location.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for entry in entries {
            if entry.is_dir() {
                let Some(index) = INDEX_FILES
                    .iter()
                    .map(|f| entry.join(f))
                    .find(|p| p.is_file())
                else {
                    tracing::debug!(dir = %entry.display(), "no index document, skipping");
                    continue;
                };
                let (_, document) = load_file(&index)?;
                let name = file_name(&entry);
                self.register(&name, document)?;
            } else if is_document_file(&entry) {
                let (name, document) = load_file(&entry)?;
                self.register(&name, document)?;
            }
        }
        Ok(())
    }
}

/// Read and parse one document; the service name is the file stem.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> Result<(String, Value), StoreError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
    let document = parse_document(path, &content)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok((name, document))
}

/// Decode the service document read from `path`.
///
/// `.json` is JSON and `.yaml`/`.yml` is YAML. Any other name is JSON when
/// the content opens with `{`, YAML otherwise.
///
/// # Errors
///
/// Returns [`StoreError::Document`] naming the file and the format it was
/// decoded as.
pub fn parse_document(path: &Path, content: &str) -> Result<Value, StoreError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let as_json = match extension.as_deref() {
        Some("json") => true,
        Some("yaml" | "yml") => false,
        _ => content.trim_start().starts_with('{'),
    };
    let decoded = if as_json {
        serde_json::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_yml::from_str(content).map_err(|e| e.to_string())
    };
    decoded.map_err(|message| StoreError::Document {
        path: path.to_path_buf(),
        format: if as_json { "JSON" } else { "YAML" },
        message,
    })
}

fn is_document_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "yaml" | "yml" | "json"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

fn path_count(doc: &Value) -> usize {
    doc.get("paths")
        .and_then(Value::as_object)
        .map_or(0, serde_json::Map::len)
}

/// Check every dynamic template against the parameters in scope for each of
/// its operations (or the path-level parameters when it declares none).
fn validate_paths(doc: &Value) -> Result<(), PathError> {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Ok(());
    };
    for (template, item) in paths {
        if path::placeholders(template).is_empty() {
            continue;
        }
        let operations: Vec<&Value> = Method::ALL
            .iter()
            .filter_map(|m| operation::select_operation(doc, item, *m))
            .collect();
        if operations.is_empty() {
            path::build_param_pattern(template, &operation::raw_parameters(doc, item, None), doc)?;
        }
        for op in operations {
            path::build_param_pattern(
                template,
                &operation::raw_parameters(doc, item, Some(op)),
                doc,
            )?;
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("{} is not a valid {format} document: {message}", path.display())]
    Document {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("Service '{0}' is already registered")]
    DuplicateService(String),
    #[error("Service '{service}': {source}")]
    MalformedPathDeclaration {
        service: String,
        #[source]
        source: PathError,
    },
}
