//! Remote command - build through a build server

use crate::api::Artifact;
use crate::cli::args::{BuildArgs, RemoteArgs};
use crate::client::{download_artifact, BuildClient};
use crate::config::Config;
use crate::error::ForgeResult;
use crate::platform::Platform;
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;

/// Execute the remote command
pub async fn execute(args: RemoteArgs, config: &Config) -> ForgeResult<()> {
    let server = args.server.unwrap_or_else(|| config.client.server.clone());
    let client = BuildClient::new(&server)?;
    let platform = target_platform(&args.build, config)?;

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!(
        "Building k6 {} for {} on {}",
        args.build.k6,
        platform,
        client.base_url()
    ));

    let artifact = match client
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

/// Platform requested on the command line, in config, or the host's
pub(super) fn target_platform(args: &BuildArgs, config: &Config) -> ForgeResult<String> {
    match args.platform.clone().or_else(|| config.client.platform.clone()) {
        Some(platform) => Ok(platform),
        None => Ok(Platform::host()?.to_string()),
    }
}

/// Print the artifact and download it when an output path is given
pub(super) async fn report(
    ctx: &UiContext,
    artifact: &Artifact,
    output: Option<&Path>,
) -> ForgeResult<()> {
    ui::section(ctx, "Artifact");
    ui::key_value(ctx, "ID", &artifact.id);
    ui::key_value(ctx, "Checksum", &artifact.checksum);
    ui::key_value(ctx, "URL", &artifact.url);
    for dep in &artifact.dependencies {
        ui::key_value(ctx, &dep.name, &format!("{} ({})", dep.version, dep.source_path));
    }

    let Some(path) = output else {
        return Ok(());
    };

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Downloading to {}", path.display()));
    match download_artifact(artifact, path).await {
        Ok(()) => {
            spinner.stop(&format!("Saved {} (checksum verified)", path.display()));
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Download failed");
            Err(e)
        }
    }
}
