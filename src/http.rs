//! Blocking HTTP client helpers shared by the remote store and build clients
//!
//! `ureq` is synchronous; async callers go through `call_blocking`.

use crate::error::{ForgeError, ForgeResult};
use std::time::Duration;
use ureq::Agent;

/// Largest response body accepted (binaries included)
pub(crate) const MAX_BODY_BYTES: u64 = 1 << 30;

/// Agent that reports HTTP error statuses as responses, so JSON error
/// bodies can be decoded
pub(crate) fn agent(timeout: Option<Duration>) -> Agent {
    let config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(timeout)
        .build();
    Agent::new_with_config(config)
}

/// Validate a server base URL given on the command line or in config
pub(crate) fn base_url(url: &str) -> ForgeResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ForgeError::Config(format!(
            "invalid server URL '{url}': expected http:// or https://"
        )));
    }
    Ok(trimmed.to_string())
}

/// Read a whole response body
pub(crate) fn read_body(
    response: &mut ureq::http::Response<ureq::Body>,
    url: &str,
) -> ForgeResult<Vec<u8>> {
    response
        .body_mut()
        .with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_vec()
        .map_err(|e| ForgeError::Remote(format!("reading response from {url}: {e}")))
}

/// Map a transport failure to a remote error naming the request
pub(crate) fn transport_error(method: &str, url: &str, err: ureq::Error) -> ForgeError {
    ForgeError::Remote(format!("{method} {url}: {err}"))
}

/// Run a blocking client call off the async executor
pub(crate) async fn call_blocking<T, F>(f: F) -> ForgeResult<T>
where
    F: FnOnce() -> ForgeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ForgeError::Internal(format!("HTTP client task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_normalizes() {
        assert_eq!(
            base_url("http://localhost:9000/").unwrap(),
            "http://localhost:9000"
        );
        assert!(matches!(
            base_url("localhost:9000"),
            Err(ForgeError::Config(_))
        ));
    }
}
