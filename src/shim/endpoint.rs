//! Sidecar endpoints: where a sidecar listens and how to address it.

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::core::error::{Result, ShimError};
use crate::util::port::{find_available_port, is_loopback};

/// How a backend decides where its sidecar listens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EndpointSpec {
    /// Pick a free loopback port at setup time.
    #[default]
    Allocate,

    /// A fixed, well-known base URI (e.g. `http://localhost:1337`).
    ///
    /// Validated at setup time: must be plain `http` on a loopback host.
    Fixed(String),
}

impl EndpointSpec {
    /// Turn the template into a concrete endpoint.
    pub fn resolve(&self) -> Result<Endpoint> {
        match self {
            EndpointSpec::Allocate => {
                let port = find_available_port().map_err(ShimError::PortAllocation)?;
                let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).map_err(|e| {
                    ShimError::InvalidEndpoint {
                        uri: format!("127.0.0.1:{}", port),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Endpoint { url, port })
            }
            EndpointSpec::Fixed(uri) => Endpoint::parse_fixed(uri),
        }
    }
}

/// A resolved sidecar endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    port: u16,
}

impl Endpoint {
    fn parse_fixed(uri: &str) -> Result<Self> {
        let invalid = |reason: &str| ShimError::InvalidEndpoint {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid("only plain http is supported"));
        }
        if !is_loopback(&url) {
            return Err(invalid("sidecars must listen on a loopback address"));
        }
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        // Keep a trailing slash so request paths append instead of replace.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Endpoint { url, port })
    }

    /// Base URL, always ending in `/`.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// TCP port the sidecar listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Build a request URL by appending path segments to the base.
    pub fn join<I, S>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|_| ShimError::InvalidUrl(self.url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Socket addresses for TCP-level readiness checks.
    pub fn socket_addrs(&self) -> std::io::Result<Vec<SocketAddr>> {
        self.url.socket_addrs(|| Some(self.port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str().trim_end_matches('/'))
    }
}
