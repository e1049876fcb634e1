//! Build service
//!
//! Orchestrates one build request: resolve the core and every extension,
//! fingerprint the resolved set, answer from the cache when possible and
//! otherwise build, checksum, store and cache the binary.
//!
//! At most one build per fingerprint runs at a time. Concurrent callers with
//! the same fingerprint queue on a keyed lock; the caller that builds leaves
//! its outcome, failure included, in the lock slot for everyone queued
//! behind it. If it is cancelled instead, the next caller in line builds.
//!
//! Binaries are stored under `<fingerprint>-<checksum>`, so the bytes behind
//! an object id never change once an artifact names it.

pub use crate::api::Artifact;

use crate::builder::Builder;
use crate::cache::BuildCache;
use crate::catalog::{Catalog, Dependency, ResolvedSet, CORE_DEPENDENCY};
use crate::error::{ForgeError, ForgeResult};
use crate::fingerprint::Fingerprint;
use crate::lock::KeyedLocks;
use crate::platform::Platform;
use crate::store::{checksum, ObjectStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolves, builds and caches custom binaries
pub struct BuildService {
    catalog: Arc<dyn Catalog>,
    builder: Arc<dyn Builder>,
    cache: Arc<dyn BuildCache>,
    objects: Arc<dyn ObjectStore>,
    in_flight: KeyedLocks<ForgeResult<Artifact>>,
    build_timeout: Option<Duration>,
}

impl BuildService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        builder: Arc<dyn Builder>,
        cache: Arc<dyn BuildCache>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            catalog,
            builder,
            cache,
            objects,
            in_flight: KeyedLocks::new(),
            build_timeout: None,
        }
    }

    /// Abort builds that run longer than `timeout`
    pub fn with_build_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Build (or fetch from cache) the binary for a request.
    ///
    /// Dropping the returned future cancels an in-progress build; nothing is
    /// stored for it.
    pub async fn build(
        &self,
        platform: &str,
        core: &str,
        dependencies: &[Dependency],
    ) -> ForgeResult<Artifact> {
        let platform = Platform::parse(platform)?;
        check_dependencies(dependencies)?;

        let resolved = self.resolve(core, dependencies).await?;
        let fingerprint = Fingerprint::compute(&platform, &resolved);
        debug!(%fingerprint, %platform, "Resolved build request");

        if let Some(artifact) = self.cached(&fingerprint).await? {
            info!(%fingerprint, "Cache hit");
            return Ok(artifact);
        }

        let mut flight = self.in_flight.lock(fingerprint.as_str()).await;

        if let Some(outcome) = flight.as_ref() {
            debug!(%fingerprint, "Sharing outcome of in-flight build");
            return share(outcome);
        }

        // Another build server may have finished this build while we waited
        if let Some(artifact) = self.cached(&fingerprint).await? {
            info!(%fingerprint, "Cache hit after waiting for in-flight build");
            return Ok(artifact);
        }

        let outcome = self.build_and_store(&platform, &resolved, &fingerprint).await;
        *flight = Some(share(&outcome));
        outcome
    }

    async fn build_and_store(
        &self,
        platform: &Platform,
        resolved: &ResolvedSet,
        fingerprint: &Fingerprint,
    ) -> ForgeResult<Artifact> {
        info!(%fingerprint, %platform, "Cache miss, building");
        let binary = self.run_builder(platform, resolved).await?;

        let sum = checksum(&binary);
        let size = binary.len();
        let id = format!("{fingerprint}-{sum}");
        let object = self.objects.create(&id, binary).await?;
        if object.checksum != sum {
            return Err(ForgeError::ChecksumMismatch {
                id: object.id,
                expected: sum,
                actual: object.checksum,
            });
        }

        let artifact = Artifact {
            id: object.id,
            checksum: object.checksum,
            url: object.url,
            dependencies: resolved.to_vec(),
        };

        match self.cache.store(fingerprint, &artifact).await {
            Ok(()) => {}
            Err(ForgeError::CacheConflict { .. }) => match self.cached(fingerprint).await? {
                Some(winner) => {
                    info!(%fingerprint, id = %winner.id, "Another build was cached first, using it");
                    return Ok(winner);
                }
                None => {
                    debug!(%fingerprint, "Replacing cache entry for a missing object");
                    self.cache.replace(fingerprint, &artifact).await?;
                }
            },
            Err(e) => return Err(e),
        }

        info!(%fingerprint, size, checksum = %artifact.checksum, "Build complete");
        Ok(artifact)
    }

    async fn resolve(&self, core: &str, dependencies: &[Dependency]) -> ForgeResult<ResolvedSet> {
        let core = self.catalog.resolve(CORE_DEPENDENCY, core).await?;

        let mut extensions = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            extensions.push(self.catalog.resolve(&dep.name, &dep.constraints).await?);
        }

        Ok(ResolvedSet { core, extensions })
    }

    /// Cached artifact whose object is still present in the store
    async fn cached(&self, fingerprint: &Fingerprint) -> ForgeResult<Option<Artifact>> {
        let Some(artifact) = self.cache.get(fingerprint).await? else {
            return Ok(None);
        };

        match self.objects.get(&artifact.id).await {
            Ok(_) => Ok(Some(artifact)),
            Err(ForgeError::NotFound(_)) => {
                warn!(%fingerprint, id = %artifact.id, "Cached artifact no longer in store, rebuilding");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn run_builder(&self, platform: &Platform, resolved: &ResolvedSet) -> ForgeResult<Vec<u8>> {
        let build = self.builder.build(platform, resolved);
        match self.build_timeout {
            Some(limit) => tokio::time::timeout(limit, build)
                .await
                .map_err(|_| ForgeError::Timeout(limit))?,
            None => build.await,
        }
    }
}

/// Copy of an outcome for another caller
fn share(outcome: &ForgeResult<Artifact>) -> ForgeResult<Artifact> {
    match outcome {
        Ok(artifact) => Ok(artifact.clone()),
        Err(e) => Err(e.replicate()),
    }
}

fn check_dependencies(dependencies: &[Dependency]) -> ForgeResult<()> {
    let mut seen = HashSet::new();
    for dep in dependencies {
        if dep.name.is_empty() {
            return Err(ForgeError::BadRequest("dependency name is empty".to_string()));
        }
        if dep.name == CORE_DEPENDENCY {
            return Err(ForgeError::BadRequest(format!(
                "{CORE_DEPENDENCY} is the core and cannot be listed as a dependency"
            )));
        }
        if !seen.insert(dep.name.as_str()) {
            return Err(ForgeError::BadRequest(format!(
                "dependency {} listed more than once",
                dep.name
            )));
        }
    }
    Ok(())
}
