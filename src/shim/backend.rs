//! Sidecar backends: which interpreter to run and what to hand it.
//!
//! A backend is a stateless description of one sidecar flavor. It knows how
//! to lay its sources out in a working directory and how to build the
//! command that starts the sidecar there. Everything stateful lives in
//! [`ShimServer`](crate::ShimServer).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::{Result, ShimError};
use crate::shim::endpoint::{Endpoint, EndpointSpec};
use crate::util::config::{ScriptConfig, SidecarConfig};
use crate::util::fs::{copy_into, write_into};
use crate::util::process::{find_executable, find_python, find_ruby, ProcessBuilder};

/// File name of the embedded Python sidecar.
pub const PYTHON_SERVICE: &str = "docshim_server.py";

/// File name of the embedded Ruby sidecar.
pub const RUBY_SERVICE: &str = "docshim_server.rb";

const PYTHON_SOURCE: &str = include_str!("../../sidecars/docshim_server.py");
const RUBY_SOURCE: &str = include_str!("../../sidecars/docshim_server.rb");

/// Sidecar flavor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    /// Embedded Python sidecar (docutils, asciidoc)
    Python,
    /// Embedded Ruby sidecar (asciidoctor)
    Ruby,
    /// User-supplied script
    Script,
}

impl BackendId {
    /// Get the backend name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Python => "python",
            BackendId::Ruby => "ruby",
            BackendId::Script => "script",
        }
    }

    /// All backend ids, in display order.
    pub fn all() -> [BackendId; 3] {
        [BackendId::Python, BackendId::Ruby, BackendId::Script]
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for BackendId {
    type Err = ShimError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" => Ok(BackendId::Python),
            "ruby" => Ok(BackendId::Ruby),
            "script" => Ok(BackendId::Script),
            _ => Err(ShimError::UnsupportedBackend {
                backend: s.to_string(),
                reason: "valid values: python, ruby, script".to_string(),
            }),
        }
    }
}

/// How to tell that a freshly spawned sidecar is ready for requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HealthCheck {
    /// Assume ready as soon as the process is alive.
    None,
    /// Ready once the endpoint accepts TCP connections.
    Tcp,
    /// Ready once the endpoint answers any HTTP request.
    #[default]
    Http,
}

/// A sidecar flavor.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Backend identifier.
    fn id(&self) -> BackendId;

    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str {
        self.id().as_str()
    }

    /// Where the sidecar listens.
    fn endpoint(&self) -> &EndpointSpec;

    /// Readiness check used after spawning.
    fn health_check(&self) -> HealthCheck {
        HealthCheck::Http
    }

    /// Write the sidecar's sources into `dir`.
    fn materialize_files(&self, dir: &Path) -> Result<()>;

    /// Build the command that starts the sidecar from `dir`.
    fn launch_command(&self, dir: &Path, endpoint: &Endpoint) -> Result<ProcessBuilder>;
}

fn materialize_error(dir: &Path) -> impl FnOnce(std::io::Error) -> ShimError + '_ {
    move |source| ShimError::Materialize {
        dir: dir.to_path_buf(),
        source,
    }
}

fn resolve_interpreter(
    backend: BackendId,
    configured: Option<&Path>,
    discover: fn() -> Option<PathBuf>,
) -> Result<PathBuf> {
    let found = match configured {
        Some(path) => find_executable(&path.to_string_lossy()),
        None => discover(),
    };

    found.ok_or_else(|| ShimError::UnsupportedBackend {
        backend: backend.to_string(),
        reason: match configured {
            Some(path) => format!("interpreter `{}` not found", path.display()),
            None => format!("no {} interpreter found on PATH", backend),
        },
    })
}

/// The embedded Python sidecar.
#[derive(Debug, Clone, Default)]
pub struct PythonBackend {
    interpreter: Option<PathBuf>,
    endpoint: EndpointSpec,
}

impl PythonBackend {
    /// Create a backend that discovers its interpreter on PATH.
    pub fn new() -> Self {
        PythonBackend::default()
    }

    /// Use a specific interpreter.
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Listen on a specific endpoint.
    pub fn with_endpoint(mut self, endpoint: EndpointSpec) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl Backend for PythonBackend {
    fn id(&self) -> BackendId {
        BackendId::Python
    }

    fn endpoint(&self) -> &EndpointSpec {
        &self.endpoint
    }

    fn materialize_files(&self, dir: &Path) -> Result<()> {
        write_into(dir, PYTHON_SERVICE, PYTHON_SOURCE.as_bytes()).map_err(materialize_error(dir))?;
        Ok(())
    }

    fn launch_command(&self, dir: &Path, endpoint: &Endpoint) -> Result<ProcessBuilder> {
        let python = resolve_interpreter(BackendId::Python, self.interpreter.as_deref(), find_python)?;
        Ok(ProcessBuilder::new(python)
            .arg(dir.join(PYTHON_SERVICE))
            .arg(endpoint.port().to_string())
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .cwd(dir))
    }
}

/// The embedded Ruby sidecar.
#[derive(Debug, Clone, Default)]
pub struct RubyBackend {
    interpreter: Option<PathBuf>,
    endpoint: EndpointSpec,
}

impl RubyBackend {
    /// Create a backend that discovers its interpreter on PATH.
    pub fn new() -> Self {
        RubyBackend::default()
    }

    /// Use a specific interpreter.
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Listen on a specific endpoint.
    pub fn with_endpoint(mut self, endpoint: EndpointSpec) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl Backend for RubyBackend {
    fn id(&self) -> BackendId {
        BackendId::Ruby
    }

    fn endpoint(&self) -> &EndpointSpec {
        &self.endpoint
    }

    fn materialize_files(&self, dir: &Path) -> Result<()> {
        write_into(dir, RUBY_SERVICE, RUBY_SOURCE.as_bytes()).map_err(materialize_error(dir))?;
        Ok(())
    }

    fn launch_command(&self, dir: &Path, endpoint: &Endpoint) -> Result<ProcessBuilder> {
        let ruby = resolve_interpreter(BackendId::Ruby, self.interpreter.as_deref(), find_ruby)?;
        Ok(ProcessBuilder::new(ruby)
            .arg(dir.join(RUBY_SERVICE))
            .arg(endpoint.port().to_string())
            .cwd(dir))
    }
}

/// A user-supplied sidecar script.
///
/// The script is copied into the working directory and run as
/// `<interpreter> <script> <port>`.
#[derive(Debug, Clone)]
pub struct ScriptBackend {
    name: String,
    interpreter: PathBuf,
    script: PathBuf,
    endpoint: EndpointSpec,
    health_check: HealthCheck,
}

impl ScriptBackend {
    /// Create a backend running `script` with `interpreter`.
    pub fn new(interpreter: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        let script = script.into();
        let name = script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| BackendId::Script.to_string());
        ScriptBackend {
            name,
            interpreter: interpreter.into(),
            script,
            endpoint: EndpointSpec::Allocate,
            health_check: HealthCheck::Http,
        }
    }

    /// Create a backend from a `[sidecar.script]` config section.
    pub fn from_config(config: &ScriptConfig) -> Self {
        let backend = ScriptBackend::new(&config.interpreter, &config.path);
        match &config.endpoint {
            Some(uri) => backend.with_endpoint(EndpointSpec::Fixed(uri.clone())),
            None => backend,
        }
    }

    /// Listen on a specific endpoint.
    pub fn with_endpoint(mut self, endpoint: EndpointSpec) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Use a different readiness check.
    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = health_check;
        self
    }

    /// Path of the original script.
    pub fn script(&self) -> &Path {
        &self.script
    }
}

impl Backend for ScriptBackend {
    fn id(&self) -> BackendId {
        BackendId::Script
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &EndpointSpec {
        &self.endpoint
    }

    fn health_check(&self) -> HealthCheck {
        self.health_check
    }

    fn materialize_files(&self, dir: &Path) -> Result<()> {
        copy_into(dir, &self.script).map_err(materialize_error(dir))?;
        Ok(())
    }

    fn launch_command(&self, dir: &Path, endpoint: &Endpoint) -> Result<ProcessBuilder> {
        let interpreter =
            resolve_interpreter(BackendId::Script, Some(self.interpreter.as_path()), || None)?;
        let file_name = self.script.file_name().ok_or_else(|| ShimError::UnsupportedBackend {
            backend: self.name.clone(),
            reason: format!("`{}` is not a script file", self.script.display()),
        })?;

        Ok(ProcessBuilder::new(interpreter)
            .arg(dir.join(file_name))
            .arg(endpoint.port().to_string())
            .cwd(dir))
    }
}

/// Build the backend for `id` from configuration.
///
/// `Script` needs a `[sidecar.script]` section; without one there is nothing
/// to launch and the id is reported as unsupported.
pub fn backend_for(id: BackendId, config: &SidecarConfig) -> Result<Arc<dyn Backend>> {
    let fixed = |uri: &Option<String>| match uri {
        Some(uri) => EndpointSpec::Fixed(uri.clone()),
        None => EndpointSpec::Allocate,
    };

    match id {
        BackendId::Python => {
            let mut backend = PythonBackend::new().with_endpoint(fixed(&config.python_endpoint));
            if let Some(ref python) = config.python {
                backend = backend.with_interpreter(python);
            }
            Ok(Arc::new(backend))
        }
        BackendId::Ruby => {
            let mut backend = RubyBackend::new().with_endpoint(fixed(&config.ruby_endpoint));
            if let Some(ref ruby) = config.ruby {
                backend = backend.with_interpreter(ruby);
            }
            Ok(Arc::new(backend))
        }
        BackendId::Script => match config.script {
            Some(ref script) => Ok(Arc::new(ScriptBackend::from_config(script))),
            None => Err(ShimError::UnsupportedBackend {
                backend: id.to_string(),
                reason: "no [sidecar.script] section configured".to_string(),
            }),
        },
    }
}
