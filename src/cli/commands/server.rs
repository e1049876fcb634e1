//! Server command - run the build server

use crate::builder::{NativeBuilder, NativeBuilderConfig};
use crate::cache::{BuildCache, FileCache, StoreCache};
use crate::catalog::JsonCatalog;
use crate::cli::args::ServerArgs;
use crate::config::Config;
use crate::error::ForgeResult;
use crate::server::{self, build_api, ServerLifecycle};
use crate::service::BuildService;
use crate::store::{FileObjectStore, ObjectStore, RemoteObjectStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Execute the server command
pub async fn execute(args: ServerArgs, config: &Config) -> ForgeResult<()> {
    let defaults = &config.server;

    let catalog_source = args.catalog.unwrap_or_else(|| defaults.catalog.clone());
    let catalog = JsonCatalog::load(&catalog_source).await?;

    let mut env = defaults.env.clone();
    env.extend(args.env);
    let enable_cgo = args.enable_cgo || defaults.enable_cgo;
    if enable_cgo {
        warn!("Enabling CGO for build service");
    }
    let builder = NativeBuilder::new(NativeBuilderConfig {
        env,
        copy_env: args.copy_env.unwrap_or(defaults.copy_env),
        enable_cgo,
        verbose: args.verbose || defaults.verbose,
        ..Default::default()
    });

    let (objects, cache) = match args.cache_url.or_else(|| defaults.cache_url.clone()) {
        Some(url) => remote_backends(&url)?,
        None => {
            let dir = args.store_dir.unwrap_or_else(|| defaults.store_dir.clone());
            local_backends(&dir)?
        }
    };

    let build_timeout = args
        .build_timeout
        .or_else(|| secs(defaults.build_timeout_secs));
    let service = BuildService::new(Arc::new(catalog), Arc::new(builder), cache, objects)
        .with_build_timeout(build_timeout);

    let shutdown_timeout = args
        .shutdown_timeout
        .unwrap_or(Duration::from_secs(defaults.shutdown_timeout_secs));
    let listener = server::bind(args.port.unwrap_or(defaults.port)).await?;

    let lifecycle = ServerLifecycle::new();
    lifecycle.shutdown_on_signal();

    server::serve(
        "build server",
        listener,
        build_api::router(Arc::new(service)),
        lifecycle,
        shutdown_timeout,
    )
    .await
}

/// Object store and cache shared through a store server
fn remote_backends(url: &str) -> ForgeResult<(Arc<dyn ObjectStore>, Arc<dyn BuildCache>)> {
    let store: Arc<dyn ObjectStore> = Arc::new(RemoteObjectStore::new(url)?);
    let cache: Arc<dyn BuildCache> = Arc::new(StoreCache::new(Arc::clone(&store)));
    info!(url, "Using remote object store and cache");
    Ok((store, cache))
}

/// Object store and cache private to this host
pub(super) fn local_backends(
    dir: &Path,
) -> ForgeResult<(Arc<dyn ObjectStore>, Arc<dyn BuildCache>)> {
    let store: Arc<dyn ObjectStore> = Arc::new(FileObjectStore::local(dir.join("objects"))?);
    let cache: Arc<dyn BuildCache> = Arc::new(FileCache::new(dir.join("cache"))?);
    info!(dir = %dir.display(), "Using local object store and cache");
    Ok((store, cache))
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}
