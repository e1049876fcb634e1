//! Directory-backed object store
//!
//! Each object lives in its own directory below the store root:
//!
//! ```text
//! <root>/<id>/data       object content
//! <root>/<id>/checksum   SHA-256 hex digest of data
//! ```
//!
//! `create` assembles both files in a staging directory and renames the
//! directory into place, so a new object appears complete or not at all,
//! and a rename onto an existing object fails instead of replacing it.
//!
//! `put` replaces the files one at a time through temporary files, data
//! first. Writers of one id are serialized within the process, so once a
//! write returns the checksum describes the data next to it.

use super::{blocking, checksum, download_url, validate_id, Object, ObjectStore};
use crate::error::{ForgeError, ForgeResult};
use crate::lock::KeyedLocks;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const DATA_FILE: &str = "data";
const CHECKSUM_FILE: &str = "checksum";
const TEMP_PREFIX: &str = ".tmp-";

/// Object store persisting to a local directory
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
    /// Store server base URL; `None` hands out `file://` URLs
    base_url: Option<String>,
    writers: KeyedLocks,
}

impl FileObjectStore {
    /// Open (creating if needed) a store served under `base_url`
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> ForgeResult<Self> {
        Self::open(root.into(), Some(base_url.into()))
    }

    /// Open a store only reachable from this host, with `file://` URLs
    pub fn local(root: impl Into<PathBuf>) -> ForgeResult<Self> {
        Self::open(root.into(), None)
    }

    fn open(root: PathBuf, base_url: Option<String>) -> ForgeResult<Self> {
        std::fs::create_dir_all(&root).map_err(|e| {
            ForgeError::Config(format!("creating store directory {}: {e}", root.display()))
        })?;
        // file:// URLs must be absolute
        let root = root.canonicalize().map_err(|e| {
            ForgeError::Config(format!("resolving store directory {}: {e}", root.display()))
        })?;
        Ok(Self {
            root,
            base_url,
            writers: KeyedLocks::new(),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn url(&self, id: &str) -> String {
        match &self.base_url {
            Some(base) => download_url(base, id),
            None => format!("file://{}", self.object_dir(id).join(DATA_FILE).display()),
        }
    }

    fn object(&self, id: &str, checksum: String) -> Object {
        Object {
            id: id.to_string(),
            checksum,
            url: self.url(id),
        }
    }

    /// Delete objects whose content is older than `max_age`.
    ///
    /// Returns the number of objects removed.
    pub async fn prune(&self, max_age: Duration) -> ForgeResult<usize> {
        let root = self.root.clone();
        let removed = blocking(move || prune_dir(&root, max_age)).await?;
        if removed > 0 {
            info!(removed, "Pruned expired objects");
        }
        Ok(removed)
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn put(&self, id: &str, content: Vec<u8>) -> ForgeResult<Object> {
        validate_id(id)?;

        let digest = checksum(&content);
        let root = self.root.clone();
        let dir = self.object_dir(id);
        let sum = digest.clone();

        // The guard moves into the blocking task: it outlives a cancelled caller
        let writer = self.writers.lock(id).await;
        blocking(move || {
            let _writer = writer;
            std::fs::create_dir_all(&dir)
                .map_err(|e| ForgeError::store(format!("creating {}", dir.display()), e))?;
            write_atomic(&root, &dir.join(DATA_FILE), &content)?;
            write_atomic(&root, &dir.join(CHECKSUM_FILE), sum.as_bytes())
        })
        .await?;

        debug!(id, checksum = %digest, "Stored object");
        Ok(self.object(id, digest))
    }

    async fn create(&self, id: &str, content: Vec<u8>) -> ForgeResult<Object> {
        validate_id(id)?;

        let digest = checksum(&content);
        let root = self.root.clone();
        let dir = self.object_dir(id);
        let sum = digest.clone();

        let writer = self.writers.lock(id).await;
        let existing = blocking(move || {
            let _writer = writer;
            commit_new(&root, &dir, &content, &sum)
        })
        .await?;

        match existing {
            None => debug!(id, checksum = %digest, "Created object"),
            Some(existing) if existing == digest => debug!(id, "Object already present"),
            Some(_) => return Err(ForgeError::ObjectExists { id: id.to_string() }),
        }
        Ok(self.object(id, digest))
    }

    async fn get(&self, id: &str) -> ForgeResult<Object> {
        validate_id(id)?;

        let dir = self.object_dir(id);
        match blocking(move || read_checksum(&dir)).await? {
            Some(digest) => Ok(self.object(id, digest)),
            None => Err(ForgeError::NotFound(id.to_string())),
        }
    }

    async fn download(&self, id: &str) -> ForgeResult<Vec<u8>> {
        validate_id(id)?;

        let dir = self.object_dir(id);
        // An object without its checksum is still being written
        if !tokio::fs::try_exists(dir.join(CHECKSUM_FILE))
            .await
            .map_err(|e| ForgeError::store(format!("checking {}", dir.display()), e))?
        {
            return Err(ForgeError::NotFound(id.to_string()));
        }

        let path = dir.join(DATA_FILE);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ForgeError::NotFound(id.to_string()),
            _ => ForgeError::store(format!("reading {}", path.display()), e),
        })
    }
}

/// Checksum of the object in `dir`, `None` if there is no complete object
fn read_checksum(dir: &Path) -> ForgeResult<Option<String>> {
    let path = dir.join(CHECKSUM_FILE);
    match std::fs::read_to_string(&path) {
        Ok(digest) => Ok(Some(digest.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ForgeError::store(format!("reading {}", path.display()), e)),
    }
}

/// Commit a new object directory at `dir`.
///
/// Returns `None` when committed, or the checksum of the object that was
/// already there.
fn commit_new(root: &Path, dir: &Path, content: &[u8], sum: &str) -> ForgeResult<Option<String>> {
    if let Some(existing) = read_checksum(dir)? {
        return Ok(Some(existing));
    }

    let staging = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir_in(root)
        .map_err(|e| ForgeError::store("creating staging directory", e))?;
    write_file(&staging.path().join(DATA_FILE), content)?;
    write_file(&staging.path().join(CHECKSUM_FILE), sum.as_bytes())?;

    match std::fs::rename(staging.path(), dir) {
        Ok(()) => Ok(None),
        // Another process committed the same id first
        Err(e) => match read_checksum(dir)? {
            Some(existing) => Ok(Some(existing)),
            None => Err(ForgeError::store(format!("committing {}", dir.display()), e)),
        },
    }
}

fn write_file(path: &Path, content: &[u8]) -> ForgeResult<()> {
    std::fs::File::create(path)
        .and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        })
        .map_err(|e| ForgeError::store(format!("writing {}", path.display()), e))
}

/// Write `content` to `dest` through a temporary file in `tmp_dir`
fn write_atomic(tmp_dir: &Path, dest: &Path, content: &[u8]) -> ForgeResult<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(tmp_dir)
        .map_err(|e| ForgeError::store("creating temporary object file", e))?;

    tmp.write_all(content)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| ForgeError::store("writing temporary object file", e))?;

    tmp.persist(dest)
        .map_err(|e| ForgeError::store(format!("committing {}", dest.display()), e.error))?;
    Ok(())
}

fn prune_dir(root: &Path, max_age: Duration) -> ForgeResult<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let entries = std::fs::read_dir(root)
        .map_err(|e| ForgeError::store(format!("listing {}", root.display()), e))?;

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_object = entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
            && !entry.file_name().to_string_lossy().starts_with('.');
        if !is_object {
            continue;
        }

        let modified = std::fs::metadata(path.join(DATA_FILE)).and_then(|m| m.modified());
        match modified {
            Ok(modified) if modified < cutoff => match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to prune {}: {}", path.display(), e),
            },
            _ => {}
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_store() -> (FileObjectStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = FileObjectStore::new(temp.path().join("store"), "http://external.url:9000")
            .unwrap();
        (store, temp)
    }

    #[tokio::test]
    async fn put_and_download_roundtrip() {
        let (store, _temp) = test_store();

        let object = store.put("objectID", b"object content".to_vec()).await.unwrap();
        assert_eq!(object.id, "objectID");
        assert_eq!(object.checksum, checksum(b"object content"));
        assert_eq!(object.url, "http://external.url:9000/store/objectID/download");

        let content = store.download("objectID").await.unwrap();
        assert_eq!(content, b"object content");
        assert_eq!(checksum(&content), object.checksum);

        let described = store.get("objectID").await.unwrap();
        assert_eq!(described, object);
    }

    #[tokio::test]
    async fn missing_object() {
        let (store, _temp) = test_store();
        assert!(matches!(store.get("absent").await, Err(ForgeError::NotFound(_))));
        assert!(matches!(
            store.download("absent").await,
            Err(ForgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_traversal_ids() {
        let (store, _temp) = test_store();
        let err = store.put("../escape", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, ForgeError::InvalidObjectId(_)));
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let (store, _temp) = test_store();
        store.put("obj", b"first".to_vec()).await.unwrap();
        let second = store.put("obj", b"second".to_vec()).await.unwrap();

        assert_eq!(store.download("obj").await.unwrap(), b"second");
        assert_eq!(store.get("obj").await.unwrap().checksum, second.checksum);
    }

    #[tokio::test]
    async fn no_temporary_files_left_behind() {
        let (store, _temp) = test_store();
        store.put("obj", vec![7u8; 4096]).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn concurrent_writers_never_expose_partial_content() {
        let (store, _temp) = test_store();
        let store = Arc::new(store);
        let a = vec![b'a'; 256 * 1024];
        let b = vec![b'b'; 256 * 1024];

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let content = if i % 2 == 0 { a.clone() } else { b.clone() };
            tasks.push(tokio::spawn(async move {
                store.put("shared", content).await.unwrap();
                let read = store.download("shared").await.unwrap();
                assert_eq!(read.len(), 256 * 1024);
                assert!(read.iter().all(|&c| c == read[0]));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let settled = store.download("shared").await.unwrap();
        assert_eq!(store.get("shared").await.unwrap().checksum, checksum(&settled));
    }

    #[tokio::test]
    async fn concurrent_overwrites_settle_consistently() {
        let (store, _temp) = test_store();
        let store = Arc::new(store);

        for round in 0..50u8 {
            let writers: Vec<_> = (0..4u8)
                .map(|i| {
                    let store = Arc::clone(&store);
                    tokio::spawn(async move {
                        store
                            .put("shared", vec![round.wrapping_mul(4).wrapping_add(i); 64 * 1024])
                            .await
                            .unwrap()
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap();
            }

            let content = store.download("shared").await.unwrap();
            let described = store.get("shared").await.unwrap();
            assert_eq!(described.checksum, checksum(&content), "round {round}");
        }
    }

    #[tokio::test]
    async fn create_keeps_the_first_object() {
        let (store, _temp) = test_store();

        let first = store.create("obj", b"first".to_vec()).await.unwrap();
        assert_eq!(first.checksum, checksum(b"first"));

        // Same content again is fine
        assert_eq!(store.create("obj", b"first".to_vec()).await.unwrap(), first);

        let err = store.create("obj", b"second".to_vec()).await.unwrap_err();
        assert!(matches!(err, ForgeError::ObjectExists { ref id } if id == "obj"));
        assert_eq!(store.download("obj").await.unwrap(), b"first");
        assert_eq!(store.get("obj").await.unwrap(), first);
    }

    #[tokio::test]
    async fn concurrent_creates_have_one_winner() {
        let (store, _temp) = test_store();
        let store = Arc::new(store);

        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.create("shared", vec![i; 32 * 1024]).await })
            })
            .collect();

        let mut created = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(object) => created.push(object),
                Err(ForgeError::ObjectExists { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(created.len(), 1);
        let content = store.download("shared").await.unwrap();
        assert_eq!(checksum(&content), created[0].checksum);
        assert_eq!(store.get("shared").await.unwrap(), created[0]);
    }

    #[tokio::test]
    async fn create_leaves_no_staging_directories() {
        let (store, _temp) = test_store();
        store.create("obj", vec![1u8; 1024]).await.unwrap();
        store.create("obj", vec![2u8; 1024]).await.unwrap_err();

        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn local_store_uses_file_urls() {
        let temp = TempDir::new().unwrap();
        let store = FileObjectStore::local(temp.path()).unwrap();
        let object = store.put("bin", b"x".to_vec()).await.unwrap();

        assert!(object.url.starts_with("file://"));
        assert!(object.url.ends_with("/bin/data"));
    }

    #[tokio::test]
    async fn prune_removes_only_expired_objects() {
        let (store, _temp) = test_store();
        store.put("old", b"old".to_vec()).await.unwrap();

        assert_eq!(store.prune(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(store.prune(Duration::ZERO).await.unwrap(), 1);
        assert!(matches!(store.get("old").await, Err(ForgeError::NotFound(_))));
    }
}
