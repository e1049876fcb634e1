//! Object store API
//!
//! | Route | Result |
//! |-------|--------|
//! | `POST /store/{id}` | store the raw body, JSON object descriptor |
//! | `POST /store/{id}` with `If-None-Match: *` | same, 409 if `id` holds other content |
//! | `GET /store/{id}` | JSON object descriptor |
//! | `GET /store/{id}/download` | raw content |

use crate::api::StoreResponse;
use crate::error::ForgeError;
use crate::http::MAX_BODY_BYTES;
use crate::store::ObjectStore;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{debug, warn};

type SharedStore = Arc<dyn ObjectStore>;

/// Router serving the store endpoints for `store`
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/store/{id}", post(put).get(describe))
        .route("/store/{id}/download", get(download))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES as usize))
        .with_state(store)
}

async fn put(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let create_only = headers
        .get(header::IF_NONE_MATCH)
        .is_some_and(|value| value.as_bytes() == b"*");
    debug!(id, bytes = body.len(), create_only, "Storing object");

    let stored = if create_only {
        store.create(&id, body.to_vec()).await
    } else {
        store.put(&id, body.to_vec()).await
    };
    match stored {
        Ok(object) => (StatusCode::OK, Json(StoreResponse::success(object))).into_response(),
        Err(e) => failure(e),
    }
}

async fn describe(State(store): State<SharedStore>, Path(id): Path<String>) -> Response {
    match store.get(&id).await {
        Ok(object) => (StatusCode::OK, Json(StoreResponse::success(object))).into_response(),
        Err(e) => failure(e),
    }
}

async fn download(State(store): State<SharedStore>, Path(id): Path<String>) -> Response {
    match store.download(&id).await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            content,
        )
            .into_response(),
        Err(e) => failure(e),
    }
}

fn failure(err: ForgeError) -> Response {
    if !matches!(err, ForgeError::NotFound(_) | ForgeError::ObjectExists { .. }) {
        warn!(kind = err.kind(), "Store request failed: {}", err);
    }
    (err.status_code(), Json(StoreResponse::failure(&err))).into_response()
}
