//! JSON registry backed catalog
//!
//! The registry maps dependency names to the module implementing them and
//! the versions available:
//!
//! ```json
//! {
//!   "k6": { "module": "go.k6.io/k6", "versions": ["v0.1.0", "v0.2.0"] },
//!   "k6/x/ext": { "module": "go.k6.io/k6ext", "versions": ["v0.1.0"] }
//! }
//! ```

use super::constraint::{parse_version, Constraint};
use super::{Catalog, ResolvedDependency};
use crate::error::{ForgeError, ForgeResult};
use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Registry entry as written in the catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub module: String,
    pub versions: Vec<String>,
}

#[derive(Debug)]
struct Module {
    path: String,
    /// Sorted ascending by version
    versions: Vec<(Version, String)>,
}

/// Catalog resolving against an in-memory registry
#[derive(Debug)]
pub struct JsonCatalog {
    modules: BTreeMap<String, Module>,
}

impl JsonCatalog {
    /// Build a catalog from registry entries
    pub fn from_entries(entries: HashMap<String, CatalogEntry>) -> ForgeResult<Self> {
        let mut modules = BTreeMap::new();

        for (name, entry) in entries {
            let mut versions = entry
                .versions
                .iter()
                .map(|raw| {
                    parse_version(raw).map(|v| (v, raw.clone())).map_err(|reason| {
                        ForgeError::Config(format!(
                            "catalog entry {name} has invalid version '{raw}': {reason}"
                        ))
                    })
                })
                .collect::<ForgeResult<Vec<_>>>()?;
            versions.sort_by(|a, b| a.0.cmp(&b.0));

            modules.insert(
                name,
                Module {
                    path: entry.module,
                    versions,
                },
            );
        }

        Ok(Self { modules })
    }

    /// Parse a catalog from registry JSON text
    pub fn from_json(json: &str) -> ForgeResult<Self> {
        let entries: HashMap<String, CatalogEntry> = serde_json::from_str(json)
            .map_err(|e| ForgeError::Config(format!("parsing catalog: {e}")))?;
        Self::from_entries(entries)
    }

    /// Load a catalog from a local file or an `http(s)://` URL
    pub async fn load(source: &str) -> ForgeResult<Self> {
        let content = if source.starts_with("http://") || source.starts_with("https://") {
            fetch(source.to_string()).await?
        } else {
            let path = Path::new(source);
            tokio::fs::read_to_string(path).await.map_err(|e| {
                ForgeError::Config(format!("reading catalog {}: {e}", path.display()))
            })?
        };

        let catalog = Self::from_json(&content)?;
        info!(source, modules = catalog.modules.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Names known to the catalog
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

async fn fetch(url: String) -> ForgeResult<String> {
    tokio::task::spawn_blocking(move || {
        let mut response = ureq::get(&url)
            .call()
            .map_err(|e| ForgeError::Config(format!("fetching catalog {url}: {e}")))?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|e| ForgeError::Config(format!("reading catalog {url}: {e}")))
    })
    .await
    .map_err(|e| ForgeError::Internal(format!("catalog fetch task failed: {e}")))?
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn resolve(&self, name: &str, constraints: &str) -> ForgeResult<ResolvedDependency> {
        let module = self
            .modules
            .get(name)
            .ok_or_else(|| ForgeError::cannot_satisfy(name, constraints))?;

        let constraint = Constraint::parse(constraints)?;

        let (_, raw) = module
            .versions
            .iter()
            .rev()
            .find(|(version, _)| constraint.matches(version))
            .ok_or_else(|| ForgeError::cannot_satisfy(name, constraints))?;

        debug!(name, %constraint, version = %raw, "Resolved dependency");

        Ok(ResolvedDependency {
            name: name.to_string(),
            version: raw.clone(),
            source_path: module.path.clone(),
        })
    }
}
