//! Native toolchain builder
//!
//! Produces custom binaries by running `xk6 build` on the host. The target
//! platform is passed through `GOOS`/`GOARCH`, extensions as `--with`
//! flags. The child process is killed if the build future is dropped.

use super::{build_error_output, stream_child_output, Builder};
use crate::catalog::ResolvedSet;
use crate::error::{ForgeError, ForgeResult};
use crate::platform::Platform;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variables forwarded when the parent environment is not copied
const PASSTHROUGH_ENV: &[&str] = &[
    "PATH", "HOME", "GOPATH", "GOCACHE", "GOMODCACHE", "GOPROXY", "GONOPROXY", "GOPRIVATE",
    "GOFLAGS", "TMPDIR",
];

/// Settings for the native builder
#[derive(Debug, Clone)]
pub struct NativeBuilderConfig {
    /// Toolchain executable
    pub program: String,
    /// Extra build environment variables
    pub env: HashMap<String, String>,
    /// Copy the whole parent environment into the build
    pub copy_env: bool,
    /// Allow CGO; disabled builds force `CGO_ENABLED=0`
    pub enable_cgo: bool,
    /// Log toolchain output at info instead of debug
    pub verbose: bool,
}

impl Default for NativeBuilderConfig {
    fn default() -> Self {
        Self {
            program: "xk6".to_string(),
            env: HashMap::new(),
            copy_env: true,
            enable_cgo: false,
            verbose: false,
        }
    }
}

/// Builder invoking the native toolchain
pub struct NativeBuilder {
    config: NativeBuilderConfig,
}

impl NativeBuilder {
    pub fn new(config: NativeBuilderConfig) -> Self {
        Self { config }
    }

    /// Toolchain arguments for a resolved set
    fn args(resolved: &ResolvedSet, output: &str) -> Vec<String> {
        let mut args = vec!["build".to_string(), resolved.core.version.clone()];
        for ext in &resolved.extensions {
            args.push("--with".to_string());
            args.push(format!("{}@{}", ext.source_path, ext.version));
        }
        args.push("--output".to_string());
        args.push(output.to_string());
        args
    }

    /// Environment for the child, after the parent environment policy
    fn env(&self, platform: &Platform) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = if self.config.copy_env {
            std::env::vars().collect()
        } else {
            PASSTHROUGH_ENV
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
                .collect()
        };

        env.extend(self.config.env.clone());
        env.insert("GOOS".to_string(), platform.os().to_string());
        env.insert("GOARCH".to_string(), platform.arch().to_string());
        if !self.config.enable_cgo {
            env.insert("CGO_ENABLED".to_string(), "0".to_string());
        }
        env
    }
}

#[async_trait]
impl Builder for NativeBuilder {
    async fn build(&self, platform: &Platform, resolved: &ResolvedSet) -> ForgeResult<Vec<u8>> {
        let workdir = TempDir::new().map_err(|e| ForgeError::io("creating build directory", e))?;
        let output = workdir.path().join("k6");
        let args = Self::args(resolved, &output.to_string_lossy());

        info!(
            %platform,
            core = %resolved.core.version,
            extensions = resolved.extensions.len(),
            "Starting toolchain build"
        );
        debug!("Executing: {} {:?}", self.config.program, args);

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .env_clear()
            .envs(self.env(platform))
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ForgeError::Build(format!("starting {}: {e}", self.config.program)))?;

        let verbose = self.config.verbose;
        let lines = stream_child_output(&mut child, &move |line| {
            if verbose {
                info!(target: "loadforge::toolchain", "{}", line);
            } else {
                debug!(target: "loadforge::toolchain", "{}", line);
            }
        })
        .await;

        let status = child
            .wait()
            .await
            .map_err(|e| ForgeError::Build(format!("waiting for {}: {e}", self.config.program)))?;

        if !status.success() {
            return Err(ForgeError::Build(format!(
                "{} exited with {}\n{}",
                self.config.program,
                status,
                build_error_output(&lines)
            )));
        }

        tokio::fs::read(&output)
            .await
            .map_err(|e| ForgeError::Build(format!("reading build output: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResolvedDependency;

    fn resolved() -> ResolvedSet {
        ResolvedSet {
            core: ResolvedDependency {
                name: "k6".to_string(),
                version: "v0.50.0".to_string(),
                source_path: "go.k6.io/k6".to_string(),
            },
            extensions: vec![ResolvedDependency {
                name: "k6/x/sql".to_string(),
                version: "v0.4.0".to_string(),
                source_path: "github.com/grafana/xk6-sql".to_string(),
            }],
        }
    }

    #[test]
    fn toolchain_args() {
        let args = NativeBuilder::args(&resolved(), "/tmp/out/k6");
        assert_eq!(
            args,
            vec![
                "build",
                "v0.50.0",
                "--with",
                "github.com/grafana/xk6-sql@v0.4.0",
                "--output",
                "/tmp/out/k6"
            ]
        );
    }

    #[test]
    fn env_sets_target_and_disables_cgo() {
        let mut config = NativeBuilderConfig {
            copy_env: false,
            ..Default::default()
        };
        config
            .env
            .insert("GOPROXY".to_string(), "http://proxy".to_string());
        let builder = NativeBuilder::new(config);

        let env = builder.env(&Platform::parse("darwin/arm64").unwrap());
        assert_eq!(env.get("GOOS").map(String::as_str), Some("darwin"));
        assert_eq!(env.get("GOARCH").map(String::as_str), Some("arm64"));
        assert_eq!(env.get("CGO_ENABLED").map(String::as_str), Some("0"));
        assert_eq!(env.get("GOPROXY").map(String::as_str), Some("http://proxy"));
    }

    #[test]
    fn env_respects_enable_cgo() {
        let builder = NativeBuilder::new(NativeBuilderConfig {
            enable_cgo: true,
            copy_env: false,
            ..Default::default()
        });
        let env = builder.env(&Platform::parse("linux/amd64").unwrap());
        assert!(!env.contains_key("CGO_ENABLED"));
    }

    #[tokio::test]
    async fn missing_toolchain_is_build_error() {
        let builder = NativeBuilder::new(NativeBuilderConfig {
            program: "loadforge-no-such-toolchain".to_string(),
            ..Default::default()
        });
        let err = builder
            .build(&Platform::parse("linux/amd64").unwrap(), &resolved())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Build(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_toolchain_reports_output() {
        let builder = NativeBuilder::new(NativeBuilderConfig {
            program: "false".to_string(),
            ..Default::default()
        });
        let err = builder
            .build(&Platform::parse("linux/amd64").unwrap(), &resolved())
            .await
            .unwrap_err();
        match err {
            ForgeError::Build(msg) => assert!(msg.starts_with("false exited with")),
            other => panic!("expected Build error, got {other:?}"),
        }
    }
}
