use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{SCHEMA_DIR_ENV, schema_source};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{location}': {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request to '{location}' failed with HTTP status {status}")]
    Http { location: String, status: u16 },
    #[error("request to '{location}' failed: {source}")]
    Network {
        location: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("'{location}' is not valid JSON: {source}")]
    Json {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("'{location}' is not a usable schema: {message}")]
    Invalid { location: String, message: String },
}

impl LoadError {
    pub fn location(&self) -> &str {
        match self {
            LoadError::Io { location, .. }
            | LoadError::Http { location, .. }
            | LoadError::Network { location, .. }
            | LoadError::Json { location, .. }
            | LoadError::Invalid { location, .. } => location,
        }
    }
}

/// Where schema documents are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaBase {
    Directory(PathBuf),
    Url(Url),
}

#[derive(Debug, Clone)]
pub struct SchemaLoader {
    base: SchemaBase,
    client: reqwest::Client,
}

impl SchemaLoader {
    pub fn new(base: SchemaBase) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    pub fn base(&self) -> &SchemaBase {
        &self.base
    }

    /// Resolved file path or URL for a schema name.
    pub fn location(&self, schema: &str) -> String {
        let file_name = schema_source(schema).file_name;
        match &self.base {
            SchemaBase::Directory(dir) => dir.join(file_name).display().to_string(),
            SchemaBase::Url(base) => base
                .join(file_name)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| format!("{base}{file_name}")),
        }
    }

    pub async fn fetch(&self, schema: &str) -> Result<Value, LoadError> {
        let location = self.location(schema);
        tracing::debug!(schema, %location, "fetching schema");

        let body = match &self.base {
            SchemaBase::Directory(_) => tokio::fs::read_to_string(&location)
                .await
                .map_err(|source| LoadError::Io {
                    location: location.clone(),
                    source,
                })?,
            SchemaBase::Url(_) => {
                let response = self.client.get(&location).send().await.map_err(|source| {
                    LoadError::Network {
                        location: location.clone(),
                        source,
                    }
                })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::Http {
                        location,
                        status: status.as_u16(),
                    });
                }
                response.text().await.map_err(|source| LoadError::Network {
                    location: location.clone(),
                    source,
                })?
            }
        };

        serde_json::from_str(&body).map_err(|source| LoadError::Json { location, source })
    }
}

/// Accepts either a directory path or an `http(s)://` base URL.
pub fn parse_base(raw: &str) -> anyhow::Result<SchemaBase> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        let mut url = Url::parse(raw)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        return Ok(SchemaBase::Url(url));
    }
    let dir = PathBuf::from(raw);
    if !dir.is_dir() {
        anyhow::bail!("schema directory '{}' does not exist", dir.display());
    }
    Ok(SchemaBase::Directory(dir))
}

/// Finds the bundled `schemas/` directory.
///
/// Checks `SCHEMAVIEW_SCHEMA_DIR`, then `schemas/` next to the working
/// directory and the executable's ancestors, then the crate sources.
pub fn locate_schema_dir() -> anyhow::Result<PathBuf> {
    if let Ok(custom) = std::env::var(SCHEMA_DIR_ENV) {
        let custom_path = PathBuf::from(custom);
        if contains_schemas(&custom_path) {
            return Ok(custom_path);
        }
        anyhow::bail!(
            "{SCHEMA_DIR_ENV}='{}' does not contain any known schema file",
            custom_path.display()
        );
    }

    let mut candidates = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("schemas"));
    }
    if let Ok(exe) = std::env::current_exe() {
        for ancestor in exe.ancestors() {
            candidates.push(ancestor.join("schemas"));
        }
    }
    candidates.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schemas"));

    candidates
        .into_iter()
        .find(|candidate| contains_schemas(candidate))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "unable to find a schemas/ directory; pass --schema-dir or set {SCHEMA_DIR_ENV}"
            )
        })
}

fn contains_schemas(dir: &Path) -> bool {
    crate::config::SCHEMAS
        .iter()
        .any(|source| dir.join(source.file_name).is_file())
}
