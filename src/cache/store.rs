//! Build cache kept in an object store
//!
//! Entries are JSON objects named `<fingerprint>.artifact`. Backed by the
//! remote store client this is the cache shared by every build server that
//! points at the same store server.
//!
//! Entries are committed with the store's create-only upload, so the first
//! build server to record a fingerprint wins on the store server itself.

use super::{BuildCache, CacheEntry};
use crate::api::Artifact;
use crate::error::{ForgeError, ForgeResult};
use crate::fingerprint::Fingerprint;
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const ENTRY_SUFFIX: &str = "artifact";

/// Build cache persisted as objects
pub struct StoreCache {
    store: Arc<dyn ObjectStore>,
}

impl StoreCache {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn entry_id(fingerprint: &Fingerprint) -> String {
        format!("{fingerprint}.{ENTRY_SUFFIX}")
    }

    async fn read(&self, fingerprint: &Fingerprint) -> ForgeResult<Option<CacheEntry>> {
        match self.store.download(&Self::entry_id(fingerprint)).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    warn!(%fingerprint, "Ignoring unreadable cache entry: {}", e);
                    Ok(None)
                }
            },
            Err(ForgeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BuildCache for StoreCache {
    async fn get(&self, fingerprint: &Fingerprint) -> ForgeResult<Option<Artifact>> {
        Ok(self.read(fingerprint).await?.map(|entry| entry.artifact))
    }

    async fn store(&self, fingerprint: &Fingerprint, artifact: &Artifact) -> ForgeResult<()> {
        let entry = CacheEntry::new(fingerprint, artifact.clone());
        let content = serde_json::to_vec(&entry)?;

        match self.store.create(&Self::entry_id(fingerprint), content).await {
            Ok(_) => {
                debug!(%fingerprint, "Cached artifact in object store");
                Ok(())
            }
            // Entries carry their creation time, so compare the artifacts
            Err(ForgeError::ObjectExists { .. }) => match self.read(fingerprint).await? {
                Some(existing) if existing.artifact == *artifact => Ok(()),
                _ => Err(ForgeError::CacheConflict {
                    fingerprint: fingerprint.to_string(),
                }),
            },
            Err(e) => Err(e),
        }
    }

    async fn replace(&self, fingerprint: &Fingerprint, artifact: &Artifact) -> ForgeResult<()> {
        let entry = CacheEntry::new(fingerprint, artifact.clone());
        let content = serde_json::to_vec(&entry)?;
        self.store.put(&Self::entry_id(fingerprint), content).await?;

        debug!(%fingerprint, "Replaced cached artifact in object store");
        Ok(())
    }
}
