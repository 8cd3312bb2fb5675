//! Test utilities for docshim unit tests.
//!
//! Provides stand-ins for the two things that are awkward to have in a unit
//! test: a sidecar speaking the HTTP protocol, and a long-lived child
//! process to supervise.
//!
//! # Example
//!
//! ```rust,ignore
//! use docshim::test_support::{SleeperBackend, StubResponse, StubSidecar};
//!
//! let stub = StubSidecar::start(|_| StubResponse::envelope("<p>hi</p>", ""));
//! let server = ShimServer::new(Arc::new(SleeperBackend::serving(&stub)), fast_options());
//! assert_eq!(server.do_conversion(&Format::RST, b"hi").unwrap(), b"<p>hi</p>");
//! ```

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::error::{Result, ShimError};
use crate::shim::backend::{Backend, BackendId, HealthCheck};
use crate::shim::endpoint::{Endpoint, EndpointSpec};
use crate::shim::server::ServerOptions;
use crate::util::fs::write_into;
use crate::util::process::ProcessBuilder;

/// A request received by [`StubSidecar`].
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl StubRequest {
    /// Body as UTF-8 text.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A canned response for [`StubSidecar`].
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl StubResponse {
    /// A plain-text response with the given status.
    pub fn status(status: u16, body: &str) -> Self {
        StubResponse {
            status,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
        }
    }

    /// A 200 conversion envelope.
    pub fn envelope(content: &str, info: &str) -> Self {
        let body = serde_json::json!({ "Content": content, "Info": info }).to_string();
        StubResponse {
            status: 200,
            content_type: "application/json",
            body: body.into_bytes(),
        }
    }
}

type Handler = dyn Fn(&StubRequest) -> StubResponse + Send + Sync;

/// A minimal in-process HTTP server standing in for a sidecar.
///
/// Serves one request per connection and records every request path.
pub struct StubSidecar {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
}

impl StubSidecar {
    /// Start serving on a free loopback port.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&StubRequest) -> StubResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind stub sidecar");
        let addr = listener.local_addr().expect("stub sidecar address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let handler: Arc<Handler> = Arc::new(handler);

        let seen = Arc::clone(&requests);
        let stop = Arc::clone(&shutdown);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                let handler = Arc::clone(&handler);
                let seen = Arc::clone(&seen);
                thread::spawn(move || serve(stream, handler.as_ref(), &seen));
            }
        });

        StubSidecar {
            addr,
            requests,
            shutdown,
        }
    }

    /// Base URL of the stub.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `METHOD /path` of every request served so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests served for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.split_once(' ').map(|(_, p)| p) == Some(path))
            .count()
    }
}

impl Drop for StubSidecar {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblock the accept loop.
        let _ = TcpStream::connect(self.addr);
    }
}

fn serve(stream: TcpStream, handler: &Handler, seen: &Mutex<Vec<String>>) {
    let Some(request) = read_request(&stream) else {
        return;
    };
    seen.lock()
        .unwrap()
        .push(format!("{} {}", request.method, request.path));

    let response = handler(&request);
    let reason = match response.status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let mut stream = stream;
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason,
        response.content_type,
        response.body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&response.body);
    let _ = stream.flush();
}

fn read_request(stream: &TcpStream) -> Option<StubRequest> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).ok()?;

    Some(StubRequest { method, path, body })
}

/// A backend whose "sidecar" is `sleep`.
///
/// Useful wherever a real, killable child process is needed. Pair it with a
/// [`StubSidecar`] via [`SleeperBackend::serving`] to also answer HTTP.
#[derive(Debug, Clone)]
pub struct SleeperBackend {
    seconds: String,
    endpoint: EndpointSpec,
    health_check: HealthCheck,
    unsupported: bool,
}

impl SleeperBackend {
    /// Sleep for ten minutes on an allocated port, assumed ready on spawn.
    pub fn new() -> Self {
        SleeperBackend {
            seconds: "600".to_string(),
            endpoint: EndpointSpec::Allocate,
            health_check: HealthCheck::None,
            unsupported: false,
        }
    }

    /// Exit by itself after `seconds`.
    pub fn lasting(seconds: &str) -> Self {
        SleeperBackend {
            seconds: seconds.to_string(),
            ..SleeperBackend::new()
        }
    }

    /// Route protocol traffic to `stub`, checking readiness over HTTP.
    pub fn serving(stub: &StubSidecar) -> Self {
        SleeperBackend {
            endpoint: EndpointSpec::Fixed(stub.url()),
            health_check: HealthCheck::Http,
            ..SleeperBackend::new()
        }
    }

    /// A backend that can never produce a launch command.
    pub fn unsupported() -> Self {
        SleeperBackend {
            unsupported: true,
            ..SleeperBackend::new()
        }
    }

    /// Use a different readiness check.
    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = health_check;
        self
    }

    /// Use a different endpoint.
    pub fn with_endpoint(mut self, endpoint: EndpointSpec) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl Backend for SleeperBackend {
    fn id(&self) -> BackendId {
        BackendId::Script
    }

    fn name(&self) -> &str {
        "sleeper"
    }

    fn endpoint(&self) -> &EndpointSpec {
        &self.endpoint
    }

    fn health_check(&self) -> HealthCheck {
        self.health_check
    }

    fn materialize_files(&self, dir: &Path) -> Result<()> {
        write_into(dir, "sleeper.marker", b"").map_err(|source| ShimError::Materialize {
            dir: dir.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    fn launch_command(&self, dir: &Path, _endpoint: &Endpoint) -> Result<ProcessBuilder> {
        if self.unsupported {
            return Err(ShimError::UnsupportedBackend {
                backend: self.name().to_string(),
                reason: "no launch command".to_string(),
            });
        }
        Ok(ProcessBuilder::new("sleep").arg(&self.seconds).cwd(dir))
    }
}

/// Server options with short timeouts for tests.
pub fn fast_options() -> ServerOptions {
    ServerOptions {
        ready_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
        probe_attempts: 2,
        probe_delay: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
