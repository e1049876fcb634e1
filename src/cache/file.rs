//! File-backed build cache
//!
//! One `<fingerprint>.json` entry per build. Entries are written to a
//! temporary file and committed with a no-clobber rename, which makes the
//! first writer win without any lock. `replace` commits with a plain rename.

use super::{BuildCache, CacheEntry};
use crate::api::Artifact;
use crate::error::{ForgeError, ForgeResult};
use crate::fingerprint::Fingerprint;
use crate::store::blocking;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

/// Build cache persisted as JSON files in a directory
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    /// Keeps a temporary cache directory alive for the cache's lifetime
    _temp: Option<TempDir>,
}

impl FileCache {
    /// Cache persisted in `dir`, created if missing
    pub fn new(dir: impl Into<PathBuf>) -> ForgeResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ForgeError::Config(format!("creating cache directory {}: {e}", dir.display()))
        })?;
        Ok(Self { dir, _temp: None })
    }

    /// Ephemeral cache removed when dropped
    pub fn temporary() -> ForgeResult<Self> {
        let temp = tempfile::Builder::new()
            .prefix("loadforge-cache-")
            .tempdir()
            .map_err(|e| ForgeError::store("creating temporary cache directory", e))?;
        Ok(Self {
            dir: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// Directory holding the entries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }
}

fn read_entry(path: &Path) -> ForgeResult<Option<CacheEntry>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ForgeError::store(format!("reading {}", path.display()), e)),
    }
}

/// Entry content in a temporary file next to the entries, ready to commit
fn write_temp(dir: &Path, content: &[u8]) -> ForgeResult<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .map_err(|e| ForgeError::store("creating temporary cache entry", e))?;
    tmp.write_all(content)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| ForgeError::store("writing temporary cache entry", e))?;
    Ok(tmp)
}

#[async_trait]
impl BuildCache for FileCache {
    async fn get(&self, fingerprint: &Fingerprint) -> ForgeResult<Option<Artifact>> {
        let path = self.entry_path(fingerprint);
        let entry = blocking(move || read_entry(&path)).await?;
        Ok(entry.map(|e| e.artifact))
    }

    async fn store(&self, fingerprint: &Fingerprint, artifact: &Artifact) -> ForgeResult<()> {
        let dir = self.dir.clone();
        let path = self.entry_path(fingerprint);
        let entry = CacheEntry::new(fingerprint, artifact.clone());
        let content = serde_json::to_vec_pretty(&entry)?;

        let committed = blocking(move || {
            match write_temp(&dir, &content)?.persist_noclobber(&path) {
                Ok(_) => Ok(None),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => read_entry(&path),
                Err(e) => Err(ForgeError::store(
                    format!("committing {}", path.display()),
                    e.error,
                )),
            }
        })
        .await?;

        match committed {
            None => {
                debug!(%fingerprint, "Cached artifact");
                Ok(())
            }
            Some(existing) if existing.artifact == *artifact => Ok(()),
            Some(_) => Err(ForgeError::CacheConflict {
                fingerprint: fingerprint.to_string(),
            }),
        }
    }

    async fn replace(&self, fingerprint: &Fingerprint, artifact: &Artifact) -> ForgeResult<()> {
        let dir = self.dir.clone();
        let path = self.entry_path(fingerprint);
        let entry = CacheEntry::new(fingerprint, artifact.clone());
        let content = serde_json::to_vec_pretty(&entry)?;

        blocking(move || {
            write_temp(&dir, &content)?
                .persist(&path)
                .map_err(|e| ForgeError::store(format!("committing {}", path.display()), e.error))?;
            Ok(())
        })
        .await?;

        debug!(%fingerprint, "Replaced cached artifact");
        Ok(())
    }
}
