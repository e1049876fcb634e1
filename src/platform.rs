//! Target platform parsing
//!
//! A platform is an `os/arch` pair such as `linux/amd64`. It is validated
//! against the operating systems and architectures the toolchain can target
//! and otherwise passed through untouched to the builder.

use crate::error::{ForgeError, ForgeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating systems accepted as build targets
const KNOWN_OS: &[&str] = &["linux", "darwin", "windows", "freebsd", "netbsd", "openbsd"];

/// Architectures accepted as build targets
const KNOWN_ARCH: &[&str] = &["amd64", "arm64", "386", "arm", "ppc64le", "s390x", "riscv64"];

/// Build target platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    os: String,
    arch: String,
}

impl Platform {
    /// Parse and validate an `os/arch` string
    pub fn parse(s: &str) -> ForgeResult<Self> {
        let invalid = || ForgeError::InvalidPlatform(s.to_string());

        let (os, arch) = s.trim().split_once('/').ok_or_else(invalid)?;
        if !KNOWN_OS.contains(&os) || !KNOWN_ARCH.contains(&arch) {
            return Err(invalid());
        }

        Ok(Self {
            os: os.to_string(),
            arch: arch.to_string(),
        })
    }

    /// Platform of the running process, when it is a known target
    pub fn host() -> ForgeResult<Self> {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "powerpc64" => "ppc64le",
            other => other,
        };
        Self::parse(&format!("{os}/{arch}"))
    }

    /// Target operating system (GOOS)
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Target architecture (GOARCH)
    pub fn arch(&self) -> &str {
        &self.arch
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Platform {
    type Error = ForgeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        value.to_string()
    }
}
