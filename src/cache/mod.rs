//! Build cache
//!
//! Maps build fingerprints to the artifacts previously produced for them,
//! so identical requests never rebuild.
//!
//! # Consistency Model
//!
//! - `store` never overwrites: the first writer for a fingerprint wins
//! - Storing equal content again is a no-op
//! - Storing different content fails with `CacheConflict`
//! - `replace` overwrites unconditionally; the build service uses it only
//!   for entries whose object has left the object store
//!
//! # Backends
//!
//! | Backend | Scope | Description |
//! |---------|-------|-------------|
//! | `FileCache` | single instance | one JSON file per fingerprint |
//! | `StoreCache` | shared | entries kept as objects in an object store |

mod file;
mod store;

pub use file::FileCache;
pub use store::StoreCache;

use crate::api::Artifact;
use crate::error::ForgeResult;
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted form of a cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub artifact: Artifact,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(fingerprint: &Fingerprint, artifact: Artifact) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            artifact,
            created_at: Utc::now(),
        }
    }
}

/// Fingerprint to artifact index consumed by the build service
#[async_trait]
pub trait BuildCache: Send + Sync {
    /// Artifact previously stored for `fingerprint`
    async fn get(&self, fingerprint: &Fingerprint) -> ForgeResult<Option<Artifact>>;

    /// Record the artifact built for `fingerprint` unless one is recorded
    async fn store(&self, fingerprint: &Fingerprint, artifact: &Artifact) -> ForgeResult<()>;

    /// Record the artifact built for `fingerprint` over any previous entry
    async fn replace(&self, fingerprint: &Fingerprint, artifact: &Artifact) -> ForgeResult<()>;
}
