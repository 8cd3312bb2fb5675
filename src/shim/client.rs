//! HTTP client for the sidecar conversion protocol.
//!
//! ```text
//! POST /<format>          raw document      -> 200 {"Content": .., "Info": ..}
//! GET  /support/<format>                    -> 200 when supported
//! ```

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::core::error::{Result, ShimError};
use crate::core::format::Format;
use crate::shim::endpoint::Endpoint;

/// Response body of a conversion call.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Content", alias = "content", default)]
    content: String,
    #[serde(rename = "Info", alias = "info", default)]
    info: String,
}

/// Blocking client for one or more sidecars.
#[derive(Debug, Clone)]
pub struct SidecarClient {
    http: Client,
}

impl SidecarClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        // Sidecars are on loopback; never route them through a proxy.
        let http = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build sidecar http client, using defaults: {}", e);
                Client::new()
            });
        SidecarClient { http }
    }

    /// Convert `input` from `format`.
    ///
    /// A non-empty `Info` in the response is returned as
    /// [`ShimError::SidecarReported`], which still carries the content.
    pub fn convert(&self, endpoint: &Endpoint, format: &Format, input: &[u8]) -> Result<Vec<u8>> {
        let url = endpoint.join([format.as_str()])?;
        tracing::debug!("POST {} ({} bytes)", url, input.len());

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "text/plain")
            .body(input.to_vec())
            .send()?;

        if response.status() != StatusCode::OK {
            return Err(ShimError::Status(response.status()));
        }

        let body = response.bytes()?;
        let envelope: Envelope = serde_json::from_slice(&body)?;
        let content = envelope.content.into_bytes();

        if !envelope.info.is_empty() {
            return Err(ShimError::SidecarReported {
                info: envelope.info,
                content,
            });
        }

        Ok(content)
    }

    /// Ask the sidecar whether it supports `format`.
    ///
    /// Only transport failures are errors; any answer, including a refusal,
    /// comes back as its status code.
    pub fn probe(&self, endpoint: &Endpoint, format: &Format) -> Result<StatusCode> {
        let url = endpoint.join(["support", format.as_str()])?;
        let response = self.http.get(url).send()?;
        Ok(response.status())
    }

    /// Check whether anything answers HTTP at the endpoint.
    pub fn ping(&self, endpoint: &Endpoint, timeout: Duration) -> bool {
        self.http
            .get(endpoint.url().clone())
            .timeout(timeout)
            .send()
            .is_ok()
    }
}
