//! Build API client
//!
//! Requests builds from a build server and downloads the resulting
//! binaries, verifying them against the artifact checksum.

use crate::api::{error_from_wire, Artifact, BuildRequest, BuildResponse};
use crate::catalog::Dependency;
use crate::error::{ForgeError, ForgeResult};
use crate::http;
use crate::store::checksum;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use ureq::Agent;

/// Builds can take minutes when the toolchain has to fetch modules
const BUILD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Client for a remote build server
#[derive(Debug, Clone)]
pub struct BuildClient {
    base_url: String,
    agent: Agent,
}

impl BuildClient {
    /// Client for the build server at `base_url` (e.g. `http://localhost:8000`)
    pub fn new(base_url: &str) -> ForgeResult<Self> {
        Ok(Self {
            base_url: http::base_url(base_url)?,
            agent: http::agent(Some(BUILD_TIMEOUT)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a build and wait for its artifact
    pub async fn build(
        &self,
        platform: &str,
        core: &str,
        dependencies: &[Dependency],
    ) -> ForgeResult<Artifact> {
        let request = BuildRequest {
            platform: platform.to_string(),
            core: core.to_string(),
            dependencies: dependencies.to_vec(),
        };
        let body = serde_json::to_vec(&request)?;
        let url = format!("{}/build", self.base_url);
        let agent = self.agent.clone();
        debug!(%url, "Requesting build");

        let response: BuildResponse = http::call_blocking(move || {
            let mut response = agent
                .post(&url)
                .header("content-type", "application/json")
                .send(&body[..])
                .map_err(|e| http::transport_error("POST", &url, e))?;
            let status = response.status();
            let body = http::read_body(&mut response, &url)?;
            serde_json::from_slice(&body).map_err(|e| {
                ForgeError::Remote(format!("invalid response from {url} ({status}): {e}"))
            })
        })
        .await?;

        if !response.error.is_empty() {
            return Err(error_from_wire(response.error_kind.as_deref(), response.error));
        }

        response
            .artifact
            .ok_or_else(|| ForgeError::Remote("build response has no artifact".to_string()))
    }
}

/// Download an artifact's binary to `dest`, verifying its checksum.
///
/// Accepts both `http(s)://` and `file://` artifact URLs. The file is made
/// executable on unix.
pub async fn download_artifact(artifact: &Artifact, dest: &Path) -> ForgeResult<()> {
    let content = fetch(&artifact.url).await?;

    let actual = checksum(&content);
    if actual != artifact.checksum {
        return Err(ForgeError::ChecksumMismatch {
            id: artifact.id.clone(),
            expected: artifact.checksum.clone(),
            actual,
        });
    }

    tokio::fs::write(dest, &content)
        .await
        .map_err(|e| ForgeError::io(format!("writing {}", dest.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        tokio::fs::set_permissions(dest, perms)
            .await
            .map_err(|e| ForgeError::io(format!("setting permissions on {}", dest.display()), e))?;
    }

    info!(path = %dest.display(), bytes = content.len(), "Downloaded artifact");
    Ok(())
}

async fn fetch(url: &str) -> ForgeResult<Vec<u8>> {
    if let Some(path) = url.strip_prefix("file://") {
        return tokio::fs::read(path)
            .await
            .map_err(|e| ForgeError::io(format!("reading {path}"), e));
    }

    let url = url.to_string();
    let agent = http::agent(Some(BUILD_TIMEOUT));
    http::call_blocking(move || {
        let mut response = agent
            .get(&url)
            .call()
            .map_err(|e| http::transport_error("GET", &url, e))?;
        let status = response.status();
        let body = http::read_body(&mut response, &url)?;
        if !status.is_success() {
            return Err(ForgeError::Remote(format!("GET {url}: {status}")));
        }
        Ok(body)
    })
    .await
}
