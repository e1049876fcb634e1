//! Content-addressed object store
//!
//! Objects are byte blobs addressed by an identifier. Every stored object
//! exposes the SHA-256 checksum of its content and a download URL that is
//! valid for clients on other hosts.
//!
//! # Backends
//!
//! | Backend | Persistence | Use |
//! |---------|-------------|-----|
//! | `FileObjectStore` | directory, atomic renames | store server, local builds |
//! | `RemoteObjectStore` | store server over HTTP | shared build servers |

mod file;
mod remote;

pub use file::FileObjectStore;
pub use remote::RemoteObjectStore;

use crate::error::{ForgeError, ForgeResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Descriptor of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Object {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Checksum")]
    pub checksum: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Blob persistence consumed by the build service and the store server
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist `content` under `id`, replacing any previous content
    async fn put(&self, id: &str, content: Vec<u8>) -> ForgeResult<Object>;

    /// Persist `content` under `id` unless `id` already holds an object.
    ///
    /// Creating an existing object again with identical content returns its
    /// descriptor; different content fails with `ForgeError::ObjectExists`
    /// and leaves the stored object untouched.
    async fn create(&self, id: &str, content: Vec<u8>) -> ForgeResult<Object>;

    /// Descriptor of a stored object, `ForgeError::NotFound` if absent
    async fn get(&self, id: &str) -> ForgeResult<Object>;

    /// Content of a stored object, `ForgeError::NotFound` if absent
    async fn download(&self, id: &str) -> ForgeResult<Vec<u8>>;
}

/// SHA-256 hex digest of `content`
pub fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Validate an object id so it can be used as a path segment and URL segment
pub fn validate_id(id: &str) -> ForgeResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 255
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(ForgeError::InvalidObjectId(id.to_string()))
    }
}

/// Download URL of an object under a store server base URL
pub fn download_url(base_url: &str, id: &str) -> String {
    format!("{}/store/{}/download", base_url.trim_end_matches('/'), id)
}

/// Run blocking filesystem work off the async executor
pub(crate) async fn blocking<T, F>(f: F) -> ForgeResult<T>
where
    F: FnOnce() -> ForgeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ForgeError::Internal(format!("blocking task failed: {e}")))?
}
