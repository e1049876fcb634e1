//! CLI argument definitions using clap derive

use crate::catalog::Dependency;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// loadforge - custom k6 binary build service
///
/// Resolves k6 and extension versions against a catalog, builds the
/// binary once per resolved set and serves it from an object store.
#[derive(Parser, Debug)]
#[command(name = "loadforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, global = true, value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Configuration file path
    #[arg(long, global = true, env = "LOADFORGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the build server
    Server(ServerArgs),

    /// Start the object store server
    Store(StoreArgs),

    /// Build a binary through a build server
    Remote(RemoteArgs),

    /// Build a binary in this process
    Local(LocalArgs),
}

/// Arguments for the server command
#[derive(Parser, Debug)]
pub struct ServerArgs {
    /// Dependency catalog: path to a local file or an URL
    #[arg(short, long)]
    pub catalog: Option<String>,

    /// Store server used as shared object store and build cache
    #[arg(long)]
    pub cache_url: Option<String>,

    /// Local store directory, used when no cache URL is given
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Build environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Enable CGO for building binaries
    #[arg(long)]
    pub enable_cgo: bool,

    /// Copy the server environment into builds
    #[arg(long)]
    pub copy_env: Option<bool>,

    /// Print build process output
    #[arg(short, long)]
    pub verbose: bool,

    /// Port the server listens on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Abort builds running longer than this (e.g. 10m)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub build_timeout: Option<Duration>,

    /// Maximum time to wait for graceful shutdown (e.g. 30s)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub shutdown_timeout: Option<Duration>,
}

/// Arguments for the store command
#[derive(Parser, Debug)]
pub struct StoreArgs {
    /// Object store directory
    #[arg(short = 'c', long)]
    pub store_dir: Option<PathBuf>,

    /// Base URL used for downloading objects (default http://localhost:<port>)
    #[arg(short, long)]
    pub download_url: Option<String>,

    /// Port the server listens on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum time to wait for graceful shutdown (e.g. 10s)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub shutdown_timeout: Option<Duration>,

    /// Delete objects older than N days (0 keeps objects forever)
    #[arg(long)]
    pub retention_days: Option<u32>,
}

/// What to build, shared by `remote` and `local`
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Target platform as os/arch (default: this host)
    #[arg(long)]
    pub platform: Option<String>,

    /// k6 version constraint
    #[arg(long, default_value = "*")]
    pub k6: String,

    /// Extension as name:constraints (e.g. k6/x/kubernetes:>v0.8.0)
    #[arg(short, long, value_parser = parse_dependency)]
    pub dependency: Vec<Dependency>,

    /// Download the binary to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the remote command
#[derive(Parser, Debug)]
pub struct RemoteArgs {
    /// Build server URL
    #[arg(long)]
    pub server: Option<String>,

    #[command(flatten)]
    pub build: BuildArgs,
}

/// Arguments for the local command
#[derive(Parser, Debug)]
pub struct LocalArgs {
    /// Dependency catalog: path to a local file or an URL
    #[arg(short, long)]
    pub catalog: Option<String>,

    /// Directory for built binaries and the build cache
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Build environment variables (KEY=VALUE)
    #[arg(short, long, value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Enable CGO for building binaries
    #[arg(long)]
    pub enable_cgo: bool,

    /// Print build process output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(flatten)]
    pub build: BuildArgs,
}

/// Parse environment variable in KEY=VALUE format
fn parse_env_var(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Parse a dependency in name:constraints format; the constraint is optional
fn parse_dependency(s: &str) -> Result<Dependency, String> {
    let (name, constraints) = s.split_once(':').unwrap_or((s, ""));
    if name.is_empty() {
        return Err(format!("invalid dependency '{s}': missing name"));
    }
    Ok(Dependency::new(name, constraints))
}
