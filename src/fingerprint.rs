//! Build fingerprints
//!
//! A fingerprint is the SHA-256 of the canonical form of a build's resolved
//! inputs: target platform, resolved core, and resolved extensions sorted.
//! It is derived after resolution, so constraints that resolve to the same
//! versions share a fingerprint.

use crate::catalog::{ResolvedDependency, ResolvedSet};
use crate::platform::Platform;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Canonical shape hashed into a fingerprint
#[derive(Serialize)]
struct FingerprintInput<'a> {
    platform: String,
    core: &'a ResolvedDependency,
    extensions: Vec<&'a ResolvedDependency>, // sorted before hashing
}

/// Cache key of a build
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a resolved build
    pub fn compute(platform: &Platform, resolved: &ResolvedSet) -> Self {
        let mut extensions: Vec<&ResolvedDependency> = resolved.extensions.iter().collect();
        extensions.sort();

        let input = FingerprintInput {
            platform: platform.to_string(),
            core: &resolved.core,
            extensions,
        };

        // Serializing plain strings and vectors cannot fail
        let canonical = serde_json::to_vec(&input).unwrap_or_default();
        Self(hex::encode(Sha256::digest(&canonical)))
    }

    /// Hex form, usable as an object id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str, version: &str) -> ResolvedDependency {
        ResolvedDependency {
            name: name.to_string(),
            version: version.to_string(),
            source_path: format!("go.k6.io/{}", name.replace('/', "-")),
        }
    }

    fn set(core: &str, extensions: &[(&str, &str)]) -> ResolvedSet {
        ResolvedSet {
            core: dep("k6", core),
            extensions: extensions.iter().map(|(n, v)| dep(n, v)).collect(),
        }
    }

    fn linux() -> Platform {
        Platform::parse("linux/amd64").unwrap()
    }

    #[test]
    fn deterministic() {
        let a = Fingerprint::compute(&linux(), &set("v0.1.0", &[("k6/x/ext", "v0.1.0")]));
        let b = Fingerprint::compute(&linux(), &set("v0.1.0", &[("k6/x/ext", "v0.1.0")]));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn extension_order_does_not_matter() {
        let a = Fingerprint::compute(
            &linux(),
            &set("v0.1.0", &[("k6/x/ext", "v0.1.0"), ("k6/x/ext2", "v0.1.0")]),
        );
        let b = Fingerprint::compute(
            &linux(),
            &set("v0.1.0", &[("k6/x/ext2", "v0.1.0"), ("k6/x/ext", "v0.1.0")]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_inputs_differ() {
        let base = Fingerprint::compute(&linux(), &set("v0.1.0", &[]));

        let other_core = Fingerprint::compute(&linux(), &set("v0.2.0", &[]));
        let other_platform =
            Fingerprint::compute(&Platform::parse("linux/arm64").unwrap(), &set("v0.1.0", &[]));
        let with_ext = Fingerprint::compute(&linux(), &set("v0.1.0", &[("k6/x/ext", "v0.1.0")]));

        assert_ne!(base, other_core);
        assert_ne!(base, other_platform);
        assert_ne!(base, with_ext);
    }

    #[test]
    fn core_is_not_interchangeable_with_extension() {
        let mut moved = set("v0.1.0", &[("k6/x/ext", "v0.2.0")]);
        std::mem::swap(&mut moved.core, &mut moved.extensions[0]);
        assert_ne!(
            Fingerprint::compute(&linux(), &moved),
            Fingerprint::compute(&linux(), &set("v0.1.0", &[("k6/x/ext", "v0.2.0")]))
        );
    }
}
