//! HTTP client for the upstream monitoring service
//!
//! Issues plaintext, single-request GETs against the monitoring service on
//! the private network and parses each full response body as JSON. No
//! redirects, no retries; every request runs under the configured timeout
//! ceiling so a hung upstream fails with a distinct timeout kind instead of
//! stalling the caller indefinitely.

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Pooled client for the monitoring service
pub struct MonitorClient {
    client: Client<HttpConnector, Empty<Bytes>>,
    base_url: String,
    timeout: Duration,
}

impl MonitorClient {
    pub fn new(upstream: &UpstreamConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Self {
            client,
            base_url: upstream.base_url(),
            timeout: upstream.timeout(),
        }
    }

    /// Issue a single GET against the monitoring service and parse the full
    /// body as JSON. The caller never sees a partial buffer.
    pub async fn fetch_json(&self, path: &str) -> Result<serde_json::Value, UpstreamError> {
        let uri = format!("{}{}", self.base_url, path);
        debug!(%uri, "Fetching upstream JSON");

        match tokio::time::timeout(self.timeout, self.fetch_inner(&uri)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout.as_secs())),
        }
    }

    async fn fetch_inner(&self, uri: &str) -> Result<serde_json::Value, UpstreamError> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header("Accept", "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let response = self.client.request(req).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        let body = response.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&body)?)
    }
}
