//! Local command - build in this process

use super::remote::{report, target_platform};
use super::server::local_backends;
use crate::builder::{NativeBuilder, NativeBuilderConfig};
use crate::catalog::JsonCatalog;
use crate::cli::args::LocalArgs;
use crate::config::Config;
use crate::error::ForgeResult;
use crate::service::BuildService;
use crate::ui::{TaskSpinner, UiContext};
use std::sync::Arc;

/// Execute the local command
pub async fn execute(args: LocalArgs, config: &Config) -> ForgeResult<()> {
    let defaults = &config.server;
    let platform = target_platform(&args.build, config)?;

    let catalog_source = args.catalog.unwrap_or_else(|| defaults.catalog.clone());
    let catalog = JsonCatalog::load(&catalog_source).await?;

    let mut env = defaults.env.clone();
    env.extend(args.env);
    let builder = NativeBuilder::new(NativeBuilderConfig {
        env,
        copy_env: defaults.copy_env,
        enable_cgo: args.enable_cgo || defaults.enable_cgo,
        verbose: args.verbose || defaults.verbose,
        ..Default::default()
    });

    let dir = args.store_dir.unwrap_or_else(|| defaults.store_dir.clone());
    let (objects, cache) = local_backends(&dir)?;
    let service = BuildService::new(Arc::new(catalog), Arc::new(builder), cache, objects);

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Building k6 {} for {}", args.build.k6, platform));

    let artifact = match service
        .build(&platform, &args.build.k6, &args.build.dependency)
        .await
    {
        Ok(artifact) => {
            spinner.stop("Build complete");
            artifact
        }
        Err(e) => {
            spinner.stop_error("Build failed");
            return Err(e);
        }
    };

    report(&ctx, &artifact, args.build.output.as_deref()).await
}
