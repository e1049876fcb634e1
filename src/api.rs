//! Wire types of the build and object store HTTP APIs
//!
//! Responses always carry an `Error` string; it is empty on success. Callers
//! should branch on `ErrorKind`, not on the HTTP status.

use crate::catalog::{Dependency, ResolvedDependency};
use crate::error::ForgeError;
use crate::store::Object;
use serde::{Deserialize, Serialize};

/// Result of a build: where to download the binary and how to verify it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Checksum")]
    pub checksum: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Dependencies", default)]
    pub dependencies: Vec<ResolvedDependency>,
}

/// Body of `POST /build`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub platform: String,
    #[serde(rename = "k6", alias = "core", default)]
    pub core: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// Body of every `/build` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildResponse {
    #[serde(rename = "Error", default)]
    pub error: String,
    #[serde(rename = "ErrorKind", default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(rename = "Artifact", default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

impl BuildResponse {
    pub fn success(artifact: Artifact) -> Self {
        Self {
            artifact: Some(artifact),
            ..Default::default()
        }
    }

    pub fn failure(err: &ForgeError) -> Self {
        Self {
            error: err.to_string(),
            error_kind: Some(err.kind().to_string()),
            artifact: None,
        }
    }
}

/// Body of every `/store` JSON response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreResponse {
    #[serde(rename = "Error", default)]
    pub error: String,
    #[serde(rename = "ErrorKind", default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(rename = "Object", default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Object>,
}

impl StoreResponse {
    pub fn success(object: Object) -> Self {
        Self {
            object: Some(object),
            ..Default::default()
        }
    }

    pub fn failure(err: &ForgeError) -> Self {
        Self {
            error: err.to_string(),
            error_kind: Some(err.kind().to_string()),
            object: None,
        }
    }
}

/// Rebuild a typed error from a response's `ErrorKind` and message
pub fn error_from_wire(kind: Option<&str>, message: String) -> ForgeError {
    match kind {
        Some("not-found") => ForgeError::NotFound(
            message
                .strip_prefix("object not found: ")
                .map(str::to_string)
                .unwrap_or(message),
        ),
        Some("cannot-satisfy") => {
            let parsed = message
                .strip_prefix("cannot satisfy dependency ")
                .and_then(|rest| rest.rsplit_once(" with constraint '"))
                .map(|(name, c)| (name.to_string(), c.trim_end_matches('\'').to_string()));
            match parsed {
                Some((name, constraints)) => ForgeError::CannotSatisfy { name, constraints },
                None => ForgeError::Remote(message),
            }
        }
        Some("build-failed") => ForgeError::Build(message),
        Some("object-exists") => match message
            .strip_prefix("object ")
            .and_then(|rest| rest.strip_suffix(" already exists with different content"))
        {
            Some(id) => ForgeError::ObjectExists { id: id.to_string() },
            None => ForgeError::Remote(message),
        },
        Some("invalid-object-id") => ForgeError::InvalidObjectId(message),
        Some("bad-request") | Some("invalid-platform") | Some("invalid-constraint") => {
            ForgeError::BadRequest(message)
        }
        _ => ForgeError::Remote(message),
    }
}
