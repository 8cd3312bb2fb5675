//! Sidecar supervision.
//!
//! A [`ShimServer`] owns one sidecar process from start to finish:
//!
//! ```text
//! setup ──> start ──> running ──> stop ──> terminated
//!   ^         │          │                     │
//!   │      (error)   (sidecar exits)           │
//!   └──────── reset <─────┴─────────────────────┘
//! ```
//!
//! Mutations (`setup`, `start`, `reset`, stop bookkeeping, error recording)
//! happen under an exclusive lock; queries take the shared lock. Each running
//! sidecar has a supervisor thread that waits for a termination signal or
//! for the child to exit, cleans up, and flips the server to terminated.

use std::collections::HashSet;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;

use crate::core::error::{ErrorLog, Result, ShimError};
use crate::core::format::Format;
use crate::shim::backend::{Backend, HealthCheck};
use crate::shim::client::SidecarClient;
use crate::shim::endpoint::Endpoint;
use crate::util::fs::{create_working_directory, remove_dir_all_if_exists};
use crate::util::retry::retry;

/// Shortest accepted poll interval; smaller values are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Timing knobs for a [`ShimServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// How long a freshly spawned sidecar may take to pass its health check.
    pub ready_timeout: Duration,

    /// Interval between readiness checks, and between liveness checks of a
    /// running sidecar. Never below [`MIN_POLL_INTERVAL`].
    pub poll_interval: Duration,

    /// Capability probe attempts on transport failure.
    pub probe_attempts: usize,

    /// Delay between capability probe attempts.
    pub probe_delay: Duration,

    /// Timeout of a single HTTP request to the sidecar.
    pub request_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            ready_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
            probe_attempts: 3,
            probe_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Set up but not started (possibly with recorded errors).
    Fresh,
    /// Sidecar alive and accepting requests.
    Running,
    /// Termination requested, supervisor still cleaning up.
    Stopping,
    /// Sidecar gone; needs `reset()` to be usable again.
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Fresh => "fresh",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
            Phase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// One-shot completion signal any number of threads can wait on.
#[derive(Debug, Default)]
struct Latch {
    released: Mutex<bool>,
    cvar: Condvar,
}

impl Latch {
    fn release(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        *released = true;
        self.cvar.notify_all();
    }

    fn wait(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        while !*released {
            released = self
                .cvar
                .wait(released)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct State {
    supported_formats: HashSet<Format>,
    running: bool,
    terminated: bool,
    stopping: bool,
    pid: u32,
    endpoint: Option<Endpoint>,
    working_directory: PathBuf,
    errors: ErrorLog,
    termination: Option<mpsc::Sender<()>>,
    closed: Arc<Latch>,
}

impl State {
    fn empty() -> Self {
        State {
            supported_formats: HashSet::new(),
            running: false,
            terminated: false,
            stopping: false,
            pid: 0,
            endpoint: None,
            working_directory: PathBuf::new(),
            errors: ErrorLog::new(),
            termination: None,
            closed: Arc::new(Latch::default()),
        }
    }

    fn mark_terminated(&mut self) {
        self.running = false;
        self.terminated = true;
        self.stopping = false;
        self.pid = 0;
        self.termination = None;
    }
}

/// Supervisor of a single sidecar process.
///
/// All methods take `&self` and are safe to call from any number of threads;
/// share the server through an `Arc`.
pub struct ShimServer {
    backend: Arc<dyn Backend>,
    options: ServerOptions,
    client: SidecarClient,
    state: Arc<RwLock<State>>,
}

impl ShimServer {
    /// Create a server for `backend` and run [`setup`](Self::reset) on it.
    ///
    /// Never fails: allocation problems are recorded and visible through
    /// [`has_error`](Self::has_error).
    pub fn new(backend: Arc<dyn Backend>, mut options: ServerOptions) -> Self {
        options.poll_interval = options.poll_interval.max(MIN_POLL_INTERVAL);
        let client = SidecarClient::new(options.request_timeout);
        let server = ShimServer {
            backend,
            options,
            client,
            state: Arc::new(RwLock::new(State::empty())),
        };
        server.setup_locked(&mut server.write());
        server
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn setup_locked(&self, state: &mut State) {
        *state = State::empty();

        match create_working_directory() {
            Ok(dir) => state.working_directory = dir,
            Err(e) => state.errors.push(ShimError::WorkingDirectory(e)),
        }

        match self.backend.endpoint().resolve() {
            Ok(endpoint) => state.endpoint = Some(endpoint),
            Err(e) => state.errors.push(e),
        }

        tracing::debug!(
            "set up `{}` in {} at {}",
            self.name(),
            state.working_directory.display(),
            state
                .endpoint
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "<no endpoint>".to_string())
        );
    }

    /// Start the sidecar.
    ///
    /// Does nothing if the server is running, terminated, or has recorded
    /// errors. Concurrent callers block until the single spawn attempt is
    /// over; afterwards the server is either running or has a new error.
    pub fn start(&self) {
        let mut state = self.write();
        if state.running || state.terminated || !state.errors.is_empty() {
            return;
        }
        let Some(endpoint) = state.endpoint.clone() else {
            return;
        };
        let dir = state.working_directory.clone();

        match self.spawn_sidecar(&dir, &endpoint, &state.closed) {
            Ok((pid, termination)) => {
                state.pid = pid;
                state.running = true;
                state.termination = Some(termination);
                tracing::info!("started sidecar `{}` (pid {}) at {}", self.name(), pid, endpoint);
            }
            Err(e) => {
                tracing::warn!("failed to start sidecar `{}`: {}", self.name(), e);
                state.errors.push(e);
            }
        }
    }

    fn spawn_sidecar(
        &self,
        dir: &Path,
        endpoint: &Endpoint,
        closed: &Arc<Latch>,
    ) -> Result<(u32, mpsc::Sender<()>)> {
        self.backend.materialize_files(dir)?;

        let result = self.launch(dir, endpoint).and_then(|child| {
            let pid = child.id();
            let (tx, rx) = mpsc::channel();
            let supervisor = Supervisor {
                name: self.name().to_string(),
                state: Arc::clone(&self.state),
                child: Arc::new(Mutex::new(child)),
                termination: rx,
                poll_interval: self.options.poll_interval,
                working_directory: dir.to_path_buf(),
                closed: Arc::clone(closed),
            };
            let child = Arc::clone(&supervisor.child);

            thread::Builder::new()
                .name(format!("docshim-{}", self.name()))
                .spawn(move || supervisor.run())
                .map_err(|source| {
                    kill(&mut child.lock().unwrap_or_else(PoisonError::into_inner));
                    ShimError::Launch {
                        command: "supervisor thread".to_string(),
                        source,
                    }
                })?;

            Ok((pid, tx))
        });

        if result.is_err() {
            if let Err(e) = remove_dir_all_if_exists(dir) {
                tracing::warn!("failed to remove {}: {}", dir.display(), e);
            }
        }
        result
    }

    fn launch(&self, dir: &Path, endpoint: &Endpoint) -> Result<Child> {
        let command = self.backend.launch_command(dir, endpoint)?;
        tracing::debug!("launching `{}`", command.display_command());

        let mut child = command.spawn().map_err(|source| ShimError::Launch {
            command: command.display_command(),
            source,
        })?;
        self.forward_stderr(&mut child);

        if let Err(e) = self.wait_until_ready(&mut child, endpoint) {
            kill(&mut child);
            return Err(e);
        }
        Ok(child)
    }

    fn forward_stderr(&self, child: &mut Child) {
        let Some(stderr) = child.stderr.take() else {
            return;
        };
        let name = self.name().to_string();

        let spawned = thread::Builder::new()
            .name(format!("docshim-{}-stderr", name))
            .spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(|line| line.ok()) {
                    tracing::debug!("[{}] {}", name, line);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("not forwarding stderr of `{}`: {}", self.name(), e);
        }
    }

    fn wait_until_ready(&self, child: &mut Child, endpoint: &Endpoint) -> Result<()> {
        let poll = self.options.poll_interval;
        let not_ready = |reason: String| ShimError::NotReady {
            backend: self.name().to_string(),
            timeout: self.options.ready_timeout,
            reason,
        };
        let deadline = Instant::now() + self.options.ready_timeout;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Err(not_ready(format!("process exited ({})", status))),
                Ok(None) => {}
                Err(e) => return Err(not_ready(e.to_string())),
            }

            let ready = match self.backend.health_check() {
                HealthCheck::None => true,
                HealthCheck::Tcp => endpoint
                    .socket_addrs()
                    .map(|addrs| {
                        addrs
                            .iter()
                            .any(|addr| TcpStream::connect_timeout(addr, poll).is_ok())
                    })
                    .unwrap_or(false),
                HealthCheck::Http => self.client.ping(endpoint, poll.max(Duration::from_millis(250))),
            };
            if ready {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(not_ready(format!("no answer from {}", endpoint)));
            }
            thread::sleep(poll);
        }
    }

    /// Stop the sidecar and wait until it is gone.
    ///
    /// No-op if the server never ran or has already terminated.
    pub fn stop(&self) {
        let closed = {
            let mut state = self.write();
            if state.terminated || !state.running {
                return;
            }

            let Some(termination) = state.termination.clone() else {
                // A running server always carries a sender; recover anyway.
                state.mark_terminated();
                state.closed.release();
                return;
            };

            if !state.stopping {
                state.stopping = true;
                tracing::debug!("stopping sidecar `{}` (pid {})", self.name(), state.pid);
                // A closed channel means the supervisor is already on its way out.
                let _ = termination.send(());
            }
            Arc::clone(&state.closed)
        };

        closed.wait();
    }

    /// Stop the sidecar and set up a fresh working directory and endpoint.
    ///
    /// Clears errors, supported formats, and the terminated flag. Does not
    /// restart.
    pub fn reset(&self) {
        loop {
            self.stop();

            let mut state = self.write();
            if state.running {
                // Started again between stop and lock.
                continue;
            }

            let old = std::mem::take(&mut state.working_directory);
            if !old.as_os_str().is_empty() {
                if let Err(e) = remove_dir_all_if_exists(&old) {
                    tracing::warn!("failed to remove {}: {}", old.display(), e);
                }
            }

            self.setup_locked(&mut state);
            return;
        }
    }

    /// Start the sidecar unless that is pointless.
    ///
    /// Returns `Ok` for running and terminated servers (terminated servers
    /// are not resurrected), the sticky log if errors are recorded, and the
    /// outcome of [`start`](Self::start) otherwise.
    pub fn start_if_needed(&self) -> Result<()> {
        {
            let state = self.read();
            if state.running || state.terminated {
                return Ok(());
            }
            if !state.errors.is_empty() {
                return Err(ShimError::Sticky(state.errors.clone()));
            }
        }

        self.start();
        match self.get_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Confirm the sidecar can convert `format`.
    ///
    /// Confirmed formats are cached; refusals and failures are not.
    pub fn supports_conversion(&self, format: &Format) -> Result<()> {
        if self.read().supported_formats.contains(format) {
            return Ok(());
        }

        self.start_if_needed()?;
        let endpoint = self.require_endpoint()?;

        let status = retry(self.options.probe_attempts, self.options.probe_delay, || {
            match self.client.probe(&endpoint, format) {
                Err(err @ ShimError::Transport(_)) => Err(err),
                other => Ok(other),
            }
        })??;

        if status != StatusCode::OK {
            return Err(ShimError::Status(status));
        }

        self.write().supported_formats.insert(format.clone());
        Ok(())
    }

    /// Convert `input` from `format`, starting the sidecar if needed.
    pub fn do_conversion(&self, format: &Format, input: &[u8]) -> Result<Vec<u8>> {
        self.start_if_needed()?;
        let endpoint = self.require_endpoint()?;
        self.client.convert(&endpoint, format, input)
    }

    fn require_endpoint(&self) -> Result<Endpoint> {
        self.endpoint()
            .ok_or_else(|| ShimError::InvalidUrl(format!("no endpoint for `{}`", self.name())))
    }

    /// Append an error to the log.
    pub fn add_error(&self, error: ShimError) {
        self.write().errors.push(error);
    }

    /// Record the error of `result`, if any, and pass the value through.
    pub fn record<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.add_error(e);
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.read().running
    }

    pub fn has_terminated(&self) -> bool {
        self.read().terminated
    }

    pub fn has_error(&self) -> bool {
        !self.read().errors.is_empty()
    }

    /// The accumulated log as a single error, if anything was recorded.
    pub fn get_error(&self) -> Option<ShimError> {
        let state = self.read();
        if state.errors.is_empty() {
            None
        } else {
            Some(ShimError::Sticky(state.errors.clone()))
        }
    }

    /// Snapshot of the error log.
    pub fn errors(&self) -> ErrorLog {
        self.read().errors.clone()
    }

    pub fn error_count(&self) -> usize {
        self.read().errors.len()
    }

    /// Process id of the sidecar, or 0 when none is running.
    pub fn pid(&self) -> u32 {
        self.read().pid
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.read().endpoint.clone()
    }

    /// Base URI of the sidecar, without trailing slash.
    pub fn uri(&self) -> Option<String> {
        self.read().endpoint.as_ref().map(|e| e.to_string())
    }

    pub fn working_directory(&self) -> PathBuf {
        self.read().working_directory.clone()
    }

    /// Formats confirmed by capability probes, sorted.
    pub fn supported_formats(&self) -> Vec<Format> {
        let mut formats: Vec<_> = self.read().supported_formats.iter().cloned().collect();
        formats.sort();
        formats
    }

    pub fn phase(&self) -> Phase {
        let state = self.read();
        if state.terminated {
            Phase::Terminated
        } else if state.stopping {
            Phase::Stopping
        } else if state.running {
            Phase::Running
        } else {
            Phase::Fresh
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Mark the server running with a stand-in supervisor and no child.
    #[cfg(test)]
    pub(crate) fn force_running(&self) {
        let (tx, rx) = mpsc::channel();
        let mut state = self.write();
        state.running = true;
        state.termination = Some(tx);

        let shared = Arc::clone(&self.state);
        let closed = Arc::clone(&state.closed);
        thread::spawn(move || {
            let _ = rx.recv();
            shared
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .mark_terminated();
            closed.release();
        });
    }

    #[cfg(test)]
    pub(crate) fn set_working_directory(&self, dir: impl Into<PathBuf>) {
        self.write().working_directory = dir.into();
    }
}

impl fmt::Debug for ShimServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShimServer")
            .field("backend", &self.name())
            .field("phase", &self.phase())
            .field("pid", &self.pid())
            .field("uri", &self.uri())
            .finish()
    }
}

impl Drop for ShimServer {
    fn drop(&mut self) {
        self.stop();

        let dir = self.working_directory();
        if !dir.as_os_str().is_empty() {
            if let Err(e) = remove_dir_all_if_exists(&dir) {
                tracing::debug!("failed to remove {}: {}", dir.display(), e);
            }
        }
    }
}

/// Owned by the thread watching one running sidecar.
struct Supervisor {
    name: String,
    state: Arc<RwLock<State>>,
    child: Arc<Mutex<Child>>,
    termination: mpsc::Receiver<()>,
    poll_interval: Duration,
    working_directory: PathBuf,
    closed: Arc<Latch>,
}

impl Supervisor {
    fn run(self) {
        let exited = self.watch();

        if let Err(e) = remove_dir_all_if_exists(&self.working_directory) {
            tracing::warn!(
                "failed to remove {}: {}",
                self.working_directory.display(),
                e
            );
        }

        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(status) = exited {
                tracing::warn!("sidecar `{}` exited unexpectedly ({})", self.name, status);
                state.errors.push(ShimError::SidecarExited {
                    backend: self.name.clone(),
                    status,
                });
            } else {
                tracing::info!("stopped sidecar `{}`", self.name);
            }
            state.mark_terminated();
        }

        self.closed.release();
    }

    /// Block until asked to stop or the child exits on its own.
    ///
    /// Returns the exit status in the latter case.
    fn watch(&self) -> Option<String> {
        loop {
            match self.termination.recv_timeout(self.poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    kill(&mut self.lock_child());
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            match self.lock_child().try_wait() {
                Ok(Some(status)) => return Some(status.to_string()),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("lost track of sidecar `{}`: {}", self.name, e);
                    kill(&mut self.lock_child());
                    return Some(e.to_string());
                }
            }
        }
    }

    fn lock_child(&self) -> std::sync::MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!("kill pid {}: {}", child.id(), e);
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shim::endpoint::EndpointSpec;
    use crate::test_support::{fast_options, wait_until, SleeperBackend, StubResponse, StubSidecar};
    use tempfile::TempDir;

    fn server(backend: SleeperBackend) -> ShimServer {
        ShimServer::new(Arc::new(backend), fast_options())
    }

    #[test]
    fn test_new_server_is_fresh() {
        let server = server(SleeperBackend::new());

        assert!(!server.is_running());
        assert!(!server.has_terminated());
        assert!(!server.has_error());
        assert!(server.get_error().is_none());
        assert_eq!(server.pid(), 0);
        assert_eq!(server.phase(), Phase::Fresh);
        assert!(server.working_directory().is_dir());
        assert!(server.uri().unwrap().starts_with("http://127.0.0.1:"));
    }

    #[test]
    fn test_add_error_under_contention() {
        let server = Arc::new(server(SleeperBackend::new()));
        server.add_error(ShimError::InvalidUrl("first".to_string()));
        assert_eq!(server.record(Ok(5)), Some(5));
        assert_eq!(server.error_count(), 1);

        let handles: Vec<_> = (0..20)
            .map(|t| {
                let server = Arc::clone(&server);
                thread::spawn(move || {
                    for i in 0..10 {
                        server.record::<()>(Err(ShimError::InvalidUrl(format!("{}-{}", t, i))));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(server.error_count(), 201);
        assert_eq!(server.get_error().unwrap().to_string().lines().count(), 201);
    }

    #[cfg(unix)]
    #[test]
    fn test_start_is_idempotent() {
        let server = server(SleeperBackend::new());
        let dir = server.working_directory();

        server.start();
        assert!(server.is_running());
        assert!(!server.has_terminated());
        let pid = server.pid();
        assert_ne!(pid, 0);
        assert!(dir.join("sleeper.marker").exists());

        server.start();
        assert_eq!(server.pid(), pid);

        server.stop();
        assert!(server.has_terminated());
        assert!(!server.is_running());
        assert_eq!(server.pid(), 0);
        assert_eq!(server.phase(), Phase::Terminated);
        assert!(!dir.exists());

        server.stop();
        assert!(server.has_terminated());
        assert!(!server.is_running());
        assert!(!server.has_error());
    }

    #[test]
    fn test_start_if_needed_with_error_never_spawns() {
        let server = server(SleeperBackend::new());
        server.add_error(ShimError::InvalidUrl("broken".to_string()));

        let err = server.start_if_needed().unwrap_err();
        assert!(matches!(err, ShimError::Sticky(_)));
        assert_eq!(err.to_string(), "invalid sidecar url: broken");
        assert_eq!(server.pid(), 0);
        assert!(!server.is_running());
    }

    #[test]
    fn test_start_if_needed_when_running() {
        let server = server(SleeperBackend::new());
        server.force_running();

        server.start_if_needed().unwrap();
        assert_eq!(server.pid(), 0);
        assert_eq!(server.phase(), Phase::Running);

        server.stop();
        assert!(server.has_terminated());
        assert!(!server.is_running());
        server.start_if_needed().unwrap();
        assert_eq!(server.pid(), 0);
    }

    #[test]
    fn test_setup_failure_is_sticky_across_reset() {
        let backend = SleeperBackend::new()
            .with_endpoint(EndpointSpec::Fixed("http://example.com:1".to_string()));
        let server = server(backend);
        assert!(server.has_error());
        assert!(server.uri().is_none());

        let err = server.start_if_needed().unwrap_err();
        assert!(matches!(err, ShimError::Sticky(_)));
        assert_eq!(server.pid(), 0);
        assert!(!server.is_running());

        server.reset();
        assert!(server.has_error());
        assert!(server
            .errors()
            .iter()
            .any(|e| matches!(**e, ShimError::InvalidEndpoint { .. })));
        assert!(server.start_if_needed().is_err());
        assert_eq!(server.pid(), 0);
    }

    #[test]
    fn test_zero_poll_interval_is_raised() {
        let options = ServerOptions {
            poll_interval: Duration::ZERO,
            ..fast_options()
        };
        let server = ShimServer::new(Arc::new(SleeperBackend::new()), options);
        assert_eq!(server.options().poll_interval, MIN_POLL_INTERVAL);

        let slower = ServerOptions {
            poll_interval: Duration::from_millis(20),
            ..fast_options()
        };
        let server = ShimServer::new(Arc::new(SleeperBackend::new()), slower);
        assert_eq!(server.options().poll_interval, Duration::from_millis(20));
    }

    #[test]
    fn test_start_with_missing_working_directory() {
        let tmp = TempDir::new().unwrap();
        let server = server(SleeperBackend::new());
        server.set_working_directory(tmp.path().join("DOES-NOT-EXIST"));

        server.start();
        assert!(!server.is_running());
        assert!(server.has_error());
        assert!(matches!(
            server.errors().iter().next().map(|e| e.as_ref()),
            Some(ShimError::Materialize { .. })
        ));
    }

    #[test]
    fn test_unsupported_backend_is_recorded() {
        let server = server(SleeperBackend::unsupported());

        assert!(server.start_if_needed().is_err());
        assert!(!server.is_running());
        assert!(server.get_error().unwrap().to_string().contains("unsupported backend"));
    }

    #[cfg(unix)]
    #[test]
    fn test_concurrent_start_spawns_once() {
        let server = Arc::new(server(SleeperBackend::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let server = Arc::clone(&server);
                thread::spawn(move || {
                    server.start();
                    server.pid()
                })
            })
            .collect();
        let pids: HashSet<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(pids.len(), 1);
        assert!(!pids.contains(&0));
        server.stop();
    }

    #[cfg(unix)]
    #[test]
    fn test_reset_replaces_working_state() {
        let server = server(SleeperBackend::new());
        let old_dir = server.working_directory();
        server.start();
        server.add_error(ShimError::InvalidUrl("stale".to_string()));

        server.reset();

        assert!(!server.is_running());
        assert!(!server.has_terminated());
        assert!(!server.has_error());
        assert_eq!(server.pid(), 0);
        assert!(!old_dir.exists());
        assert_ne!(server.working_directory(), old_dir);
        assert!(server.working_directory().is_dir());

        server.start();
        assert!(server.is_running());
        server.stop();
    }

    #[cfg(unix)]
    #[test]
    fn test_sidecar_exit_is_detected() {
        let server = server(SleeperBackend::lasting("1"));
        server.start();
        assert!(server.is_running());

        assert!(wait_until(Duration::from_secs(5), || server.has_terminated()));
        assert!(!server.is_running());
        assert_eq!(server.pid(), 0);
        assert!(matches!(
            server.errors().iter().next().map(|e| e.as_ref()),
            Some(ShimError::SidecarExited { .. })
        ));

        // Stopping a server that already went away is a no-op.
        server.stop();
        assert!(server.has_terminated());
    }

    #[cfg(unix)]
    #[test]
    fn test_readiness_timeout() {
        let backend = SleeperBackend::new().with_health_check(HealthCheck::Tcp);
        let options = ServerOptions {
            ready_timeout: Duration::from_millis(200),
            ..fast_options()
        };
        let server = ShimServer::new(Arc::new(backend), options);
        let dir = server.working_directory();

        server.start();
        assert!(!server.is_running());
        assert_eq!(server.pid(), 0);
        assert!(matches!(
            server.errors().iter().next().map(|e| e.as_ref()),
            Some(ShimError::NotReady { .. })
        ));
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_conversion_starts_lazily() {
        let stub = StubSidecar::start(|req| match req.path.as_str() {
            "/rst" => StubResponse::envelope(&req.body_text().to_uppercase(), ""),
            _ => StubResponse::status(200, "ok"),
        });
        let server = server(SleeperBackend::serving(&stub));
        assert!(!server.is_running());

        let out = server.do_conversion(&Format::RST, b"hello").unwrap();
        assert_eq!(out, b"HELLO");
        assert!(server.is_running());
        server.stop();
    }

    #[cfg(unix)]
    #[test]
    fn test_reported_info_and_transport_errors_are_not_sticky() {
        let stub = StubSidecar::start(|req| match req.path.as_str() {
            "/rst" => StubResponse::envelope("<p>partial</p>", "line 1: warning"),
            "/asciidoc" => StubResponse::status(500, "boom"),
            _ => StubResponse::status(200, "ok"),
        });
        let server = server(SleeperBackend::serving(&stub));

        let err = server.do_conversion(&Format::RST, b"x").unwrap_err();
        assert_eq!(err.to_string(), "line 1: warning");
        assert_eq!(err.partial_content(), Some(&b"<p>partial</p>"[..]));

        let err = server.do_conversion(&Format::ASCIIDOC, b"x").unwrap_err();
        assert!(matches!(err, ShimError::Status(s) if s.as_u16() == 500));

        assert!(!server.has_error());
        assert!(server.is_running());
        server.stop();
    }

    #[cfg(unix)]
    #[test]
    fn test_capability_cache_is_positive_only() {
        let stub = StubSidecar::start(|req| match req.path.as_str() {
            "/support/rst" => StubResponse::status(200, "yes"),
            "/support/markdown" => StubResponse::status(404, "no"),
            _ => StubResponse::status(200, "ok"),
        });
        let server = server(SleeperBackend::serving(&stub));
        let markdown = Format::new("markdown");

        server.supports_conversion(&Format::RST).unwrap();
        server.supports_conversion(&Format::RST).unwrap();
        assert_eq!(stub.hits("/support/rst"), 1);
        assert_eq!(server.supported_formats(), vec![Format::RST]);

        assert!(server.supports_conversion(&markdown).is_err());
        assert!(server.supports_conversion(&markdown).is_err());
        assert_eq!(stub.hits("/support/markdown"), 2);
        assert!(!server.has_error());

        server.reset();
        assert!(server.supported_formats().is_empty());
    }
}
