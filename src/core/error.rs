//! Error types for sidecar supervision and conversion.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::format::Format;

/// Result type for docshim operations.
pub type Result<T> = std::result::Result<T, ShimError>;

/// Errors produced while supervising sidecars or talking to them.
///
/// Setup and spawn errors are sticky: a [`ShimServer`](crate::ShimServer)
/// keeps them in its log and refuses to start until reset. Transport,
/// sidecar-reported, and routing errors are returned for a single call only.
#[derive(Debug, Error)]
pub enum ShimError {
    /// No local TCP port could be obtained.
    #[error("unable to obtain a valid tcp port: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// A fixed endpoint failed validation.
    #[error("invalid sidecar endpoint `{uri}`: {reason}")]
    InvalidEndpoint { uri: String, reason: String },

    /// The temporary working directory could not be created.
    #[error("failed to create working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),

    /// Sidecar sources could not be written into the working directory.
    #[error("failed to write sidecar files into {}: {source}", dir.display())]
    Materialize {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend cannot produce a launch command on this machine.
    #[error("unsupported backend `{backend}`: {reason}")]
    UnsupportedBackend { backend: String, reason: String },

    /// Spawning the sidecar process failed.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The sidecar was spawned but never answered its readiness check.
    #[error("sidecar `{backend}` did not become ready within {timeout:?}: {reason}")]
    NotReady {
        backend: String,
        timeout: Duration,
        reason: String,
    },

    /// The sidecar process went away without being asked to.
    #[error("sidecar `{backend}` exited unexpectedly ({status})")]
    SidecarExited { backend: String, status: String },

    /// The HTTP request to the sidecar failed.
    #[error("request to sidecar failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sidecar answered with a non-200 status.
    #[error("sidecar responded with {0}")]
    Status(reqwest::StatusCode),

    /// The sidecar response was not the expected JSON envelope.
    #[error("failed to decode sidecar response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A request URL could not be built from the sidecar endpoint.
    #[error("invalid sidecar url: {0}")]
    InvalidUrl(String),

    /// The sidecar ran but flagged a problem; `content` holds whatever it
    /// produced anyway.
    #[error("{info}")]
    SidecarReported { info: String, content: Vec<u8> },

    /// No server is routed for the format.
    #[error("server for '{0}' is not registered")]
    NotRegistered(Format),

    /// A server is routed for the format but could not confirm support.
    #[error("registered server for '{format}' does not support conversion [{reason}]")]
    UnsupportedFormat { format: Format, reason: String },

    /// The accumulated log of a server.
    #[error("{0}")]
    Sticky(ErrorLog),

    /// Every attempt of a retried operation failed.
    #[error("after {attempts} attempts, last error: {last}")]
    Retry {
        attempts: usize,
        last: Box<ShimError>,
    },
}

impl ShimError {
    /// Content the sidecar produced alongside a reported problem.
    pub fn partial_content(&self) -> Option<&[u8]> {
        match self {
            ShimError::SidecarReported { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// Ordered, append-only list of errors recorded by a server.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog(Vec<Arc<ShimError>>);

impl ErrorLog {
    /// Create an empty log.
    pub fn new() -> Self {
        ErrorLog(Vec::new())
    }

    /// Append an error.
    pub fn push(&mut self, error: ShimError) {
        self.0.push(Arc::new(error));
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the recorded errors, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ShimError>> {
        self.0.iter()
    }
}

impl fmt::Display for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}
