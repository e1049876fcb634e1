//! Build API
//!
//! `POST /build` takes a JSON `BuildRequest` and answers with a
//! `BuildResponse`. Errors are JSON too, with the HTTP status derived from
//! the error.

use crate::api::{BuildRequest, BuildResponse};
use crate::error::ForgeError;
use crate::service::BuildService;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

/// Router serving the build endpoint
pub fn router(service: Arc<BuildService>) -> Router {
    Router::new()
        .route("/build", post(build))
        .route("/build/", post(build))
        .with_state(service)
}

async fn build(State(service): State<Arc<BuildService>>, body: Bytes) -> Response {
    let request: BuildRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return failure(ForgeError::BadRequest(format!("invalid build request: {e}"))),
    };

    info!(
        platform = %request.platform,
        k6 = %request.core,
        dependencies = request.dependencies.len(),
        "Build requested"
    );

    match service
        .build(&request.platform, &request.core, &request.dependencies)
        .await
    {
        Ok(artifact) => (StatusCode::OK, Json(BuildResponse::success(artifact))).into_response(),
        Err(e) => failure(e),
    }
}

fn failure(err: ForgeError) -> Response {
    warn!(kind = err.kind(), "Build request failed: {}", err);
    (err.status_code(), Json(BuildResponse::failure(&err))).into_response()
}
