//! Dependency catalog
//!
//! Resolves a dependency name plus a constraint expression to a concrete
//! version. The build service only depends on the `Catalog` trait; the
//! JSON registry implementation is what the CLI wires in.

pub mod constraint;
mod json;

pub use constraint::Constraint;
pub use json::{CatalogEntry, JsonCatalog};

use crate::error::ForgeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Catalog name of the core binary every build starts from
pub const CORE_DEPENDENCY: &str = "k6";

/// A named extension and the version constraint requested for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub constraints: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, constraints: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraints: constraints.into(),
        }
    }
}

/// Concrete version chosen by the catalog for a dependency
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolvedDependency {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "SourcePath")]
    pub source_path: String,
}

/// Everything one build request resolved to: the core plus its extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSet {
    pub core: ResolvedDependency,
    /// Extensions in the order the caller supplied them
    pub extensions: Vec<ResolvedDependency>,
}

impl ResolvedSet {
    /// Core first, then extensions
    pub fn all(&self) -> impl Iterator<Item = &ResolvedDependency> {
        std::iter::once(&self.core).chain(self.extensions.iter())
    }

    /// Owned list of every resolved dependency, core first
    pub fn to_vec(&self) -> Vec<ResolvedDependency> {
        self.all().cloned().collect()
    }
}

/// Resolution capability consumed by the build service
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve `name` to a version satisfying `constraints`.
    ///
    /// Fails with `ForgeError::CannotSatisfy` when no known version matches.
    async fn resolve(&self, name: &str, constraints: &str) -> ForgeResult<ResolvedDependency>;
}
