//! Store command - run the object store server

use crate::cli::args::StoreArgs;
use crate::config::Config;
use crate::error::{ForgeError, ForgeResult};
use crate::http;
use crate::server::{self, store_api, ServerLifecycle};
use crate::store::FileObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Execute the store command
pub async fn execute(args: StoreArgs, config: &Config) -> ForgeResult<()> {
    let defaults = &config.store;

    let listener = server::bind(args.port.unwrap_or(defaults.port)).await?;
    let port = listener
        .local_addr()
        .map_err(|e| ForgeError::io("reading listener address", e))?
        .port();

    let download_url = match args.download_url.or_else(|| defaults.download_url.clone()) {
        Some(url) => http::base_url(&url)?,
        None => format!("http://localhost:{port}"),
    };

    let dir = args.store_dir.unwrap_or_else(|| defaults.store_dir.clone());
    let store = FileObjectStore::new(dir, download_url.clone())?;
    info!(dir = %store.root().display(), %download_url, "Object store ready");

    let lifecycle = ServerLifecycle::new();
    lifecycle.shutdown_on_signal();

    let retention_days = args.retention_days.unwrap_or(defaults.retention_days);
    if retention_days > 0 {
        let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 3600);
        spawn_pruner(store.clone(), max_age, lifecycle.clone());
    }

    let shutdown_timeout = args
        .shutdown_timeout
        .unwrap_or(Duration::from_secs(defaults.shutdown_timeout_secs));

    server::serve(
        "store server",
        listener,
        store_api::router(Arc::new(store)),
        lifecycle,
        shutdown_timeout,
    )
    .await
}

/// Prune expired objects now and then every hour until shutdown
fn spawn_pruner(store: FileObjectStore, max_age: Duration, lifecycle: ServerLifecycle) {
    info!(?max_age, "Object retention enabled");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = store.prune(max_age).await {
                        warn!("Failed to prune object store: {}", e);
                    }
                }
                _ = lifecycle.draining() => break,
            }
        }
    });
}
