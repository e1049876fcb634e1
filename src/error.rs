//! Error types for loadforge
//!
//! All modules use `ForgeResult<T>` as their return type.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for loadforge operations
pub type ForgeResult<T> = Result<T, ForgeError>;

/// All errors that can occur in loadforge
#[derive(Error, Debug)]
pub enum ForgeError {
    // Resolution errors
    #[error("cannot satisfy dependency {name} with constraint '{constraints}'")]
    CannotSatisfy { name: String, constraints: String },

    #[error("invalid constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    #[error("invalid platform '{0}': expected os/arch such as linux/amd64")]
    InvalidPlatform(String),

    // Build errors
    #[error("build failed: {0}")]
    Build(String),

    #[error("build timed out after {0:?}")]
    Timeout(std::time::Duration),

    // Store and cache errors
    #[error("store error: {context}")]
    Store {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote store error: {0}")]
    Remote(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object id '{0}'")]
    InvalidObjectId(String),

    #[error("checksum mismatch for {id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("cache entry for {fingerprint} already exists with different content")]
    CacheConflict { fingerprint: String },

    #[error("object {id} already exists with different content")]
    ObjectExists { id: String },

    // Request errors
    #[error("bad request: {0}")]
    BadRequest(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a store backing error with context
    pub fn store(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }

    /// Create an unsatisfiable-constraint error
    pub fn cannot_satisfy(name: impl Into<String>, constraints: impl Into<String>) -> Self {
        Self::CannotSatisfy {
            name: name.into(),
            constraints: constraints.into(),
        }
    }

    /// Stable machine-readable code, carried in HTTP error responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CannotSatisfy { .. } => "cannot-satisfy",
            Self::InvalidConstraint { .. } => "invalid-constraint",
            Self::InvalidPlatform(_) => "invalid-platform",
            Self::Build(_) => "build-failed",
            Self::Timeout(_) => "timeout",
            Self::Store { .. } | Self::Remote(_) | Self::ChecksumMismatch { .. } => {
                "store-failed"
            }
            Self::NotFound(_) => "not-found",
            Self::InvalidObjectId(_) => "invalid-object-id",
            Self::CacheConflict { .. } => "cache-conflict",
            Self::ObjectExists { .. } => "object-exists",
            Self::BadRequest(_) | Self::Json(_) => "bad-request",
            Self::Config(_) | Self::ConfigInvalid { .. } => "config",
            Self::Io { .. } | Self::Internal(_) => "internal",
        }
    }

    /// HTTP status used when this error is returned by a server
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConstraint { .. }
            | Self::InvalidPlatform(_)
            | Self::InvalidObjectId(_)
            | Self::BadRequest(_)
            | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::CannotSatisfy { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::CacheConflict { .. } | Self::ObjectExists { .. } => StatusCode::CONFLICT,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Equivalent error for another caller of the same failed operation.
    ///
    /// Kind, status and message are preserved; I/O sources are copied by
    /// kind and text.
    pub fn replicate(&self) -> Self {
        let copy_io = |e: &std::io::Error| std::io::Error::new(e.kind(), e.to_string());
        match self {
            Self::CannotSatisfy { name, constraints } => Self::cannot_satisfy(name, constraints),
            Self::InvalidConstraint { constraint, reason } => Self::InvalidConstraint {
                constraint: constraint.clone(),
                reason: reason.clone(),
            },
            Self::InvalidPlatform(p) => Self::InvalidPlatform(p.clone()),
            Self::Build(msg) => Self::Build(msg.clone()),
            Self::Timeout(limit) => Self::Timeout(*limit),
            Self::Store { context, source } => Self::store(context.clone(), copy_io(source)),
            Self::Remote(msg) => Self::Remote(msg.clone()),
            Self::NotFound(id) => Self::NotFound(id.clone()),
            Self::InvalidObjectId(id) => Self::InvalidObjectId(id.clone()),
            Self::ChecksumMismatch {
                id,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                id: id.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::CacheConflict { fingerprint } => Self::CacheConflict {
                fingerprint: fingerprint.clone(),
            },
            Self::ObjectExists { id } => Self::ObjectExists { id: id.clone() },
            Self::BadRequest(msg) => Self::BadRequest(msg.clone()),
            Self::Json(e) => Self::BadRequest(e.to_string()),
            Self::Config(msg) => Self::Config(msg.clone()),
            Self::ConfigInvalid { path, reason } => Self::ConfigInvalid {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::Io { context, source } => Self::io(context.clone(), copy_io(source)),
            Self::Internal(msg) => Self::Internal(msg.clone()),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CannotSatisfy { .. } => {
                Some("Check the catalog for the versions available for this dependency")
            }
            Self::InvalidPlatform(_) => Some("Use os/arch, for example linux/amd64"),
            Self::Remote(_) => Some("Is the server running? Check --server / --cache-url"),
            _ => None,
        }
    }
}
