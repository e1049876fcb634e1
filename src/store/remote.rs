//! Object store client for a remote store server

use super::{validate_id, Object, ObjectStore};
use crate::api::{error_from_wire, StoreResponse};
use crate::error::{ForgeError, ForgeResult};
use crate::http;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Object store reached over the store server HTTP API
#[derive(Debug, Clone)]
pub struct RemoteObjectStore {
    base_url: String,
    agent: Agent,
}

impl RemoteObjectStore {
    /// Client for the store server at `base_url` (e.g. `http://localhost:9000`)
    pub fn new(base_url: &str) -> ForgeResult<Self> {
        Ok(Self {
            base_url: http::base_url(base_url)?,
            agent: http::agent(Some(REQUEST_TIMEOUT)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn object_url(&self, id: &str) -> String {
        format!("{}/store/{}", self.base_url, id)
    }
}

/// Decode a JSON store response into an object descriptor
fn decode(body: &[u8], url: &str) -> ForgeResult<Object> {
    let response: StoreResponse = serde_json::from_slice(body)
        .map_err(|e| ForgeError::Remote(format!("invalid response from {url}: {e}")))?;

    if !response.error.is_empty() {
        return Err(error_from_wire(response.error_kind.as_deref(), response.error));
    }

    response
        .object
        .ok_or_else(|| ForgeError::Remote(format!("response from {url} has no object")))
}

impl RemoteObjectStore {
    async fn upload(&self, id: &str, content: Vec<u8>, create_only: bool) -> ForgeResult<Object> {
        validate_id(id)?;
        let url = self.object_url(id);
        let agent = self.agent.clone();
        debug!(id, bytes = content.len(), create_only, "Uploading object");

        http::call_blocking(move || {
            let mut request = agent
                .post(&url)
                .header("content-type", "application/octet-stream");
            if create_only {
                request = request.header("if-none-match", "*");
            }
            let mut response = request
                .send(&content[..])
                .map_err(|e| http::transport_error("POST", &url, e))?;
            let body = http::read_body(&mut response, &url)?;
            decode(&body, &url)
        })
        .await
    }
}

#[async_trait]
impl ObjectStore for RemoteObjectStore {
    async fn put(&self, id: &str, content: Vec<u8>) -> ForgeResult<Object> {
        self.upload(id, content, false).await
    }

    async fn create(&self, id: &str, content: Vec<u8>) -> ForgeResult<Object> {
        self.upload(id, content, true).await
    }

    async fn get(&self, id: &str) -> ForgeResult<Object> {
        validate_id(id)?;
        let url = self.object_url(id);
        let agent = self.agent.clone();

        http::call_blocking(move || {
            let mut response = agent
                .get(&url)
                .call()
                .map_err(|e| http::transport_error("GET", &url, e))?;
            let body = http::read_body(&mut response, &url)?;
            decode(&body, &url)
        })
        .await
    }

    async fn download(&self, id: &str) -> ForgeResult<Vec<u8>> {
        validate_id(id)?;
        let url = format!("{}/download", self.object_url(id));
        let agent = self.agent.clone();
        let id = id.to_string();

        http::call_blocking(move || {
            let mut response = agent
                .get(&url)
                .call()
                .map_err(|e| http::transport_error("GET", &url, e))?;
            let status = response.status();
            let body = http::read_body(&mut response, &url)?;

            if status == ureq::http::StatusCode::NOT_FOUND {
                return Err(ForgeError::NotFound(id));
            }
            if !status.is_success() {
                return Err(ForgeError::Remote(format!(
                    "GET {url}: {status}: {}",
                    String::from_utf8_lossy(&body)
                )));
            }
            Ok(body)
        })
        .await
    }
}
