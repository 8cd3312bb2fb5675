//! Configuration file support for docshim.
//!
//! docshim reads two optional configuration files:
//! - Global: `<config dir>/docshim/config.toml` - User-wide defaults
//! - Project: `.docshim/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::shim::server::{ServerOptions, MIN_POLL_INTERVAL};

/// docshim configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sidecar launch settings
    pub sidecar: SidecarConfig,

    /// Supervision and protocol settings
    pub server: ServerConfig,
}

/// Settings controlling how sidecars are launched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Python interpreter (defaults to `python3`/`python` on PATH)
    pub python: Option<PathBuf>,

    /// Ruby interpreter (defaults to `ruby` on PATH)
    pub ruby: Option<PathBuf>,

    /// Fixed base URI of an already-provisioned Python sidecar port
    /// (e.g. `http://localhost:1337`). Unset means "allocate a free port".
    pub python_endpoint: Option<String>,

    /// Fixed base URI for the Ruby sidecar.
    pub ruby_endpoint: Option<String>,

    /// An extra user-supplied sidecar script
    pub script: Option<ScriptConfig>,
}

/// A user-supplied sidecar script speaking the docshim protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Interpreter used to run the script
    pub interpreter: PathBuf,

    /// Path to the script; it is copied into the working directory
    pub path: PathBuf,

    /// Formats routed to this script
    #[serde(default)]
    pub formats: Vec<String>,

    /// Fixed base URI, if the script does not take a port argument
    pub endpoint: Option<String>,
}

/// Supervision and protocol settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// How long a freshly spawned sidecar may take to answer, in milliseconds
    pub ready_timeout_ms: Option<u64>,

    /// Interval between readiness polls and child liveness checks
    pub poll_interval_ms: Option<u64>,

    /// Attempts for a capability probe that fails at the transport level
    pub probe_attempts: Option<usize>,

    /// Delay between capability probe attempts, in milliseconds
    pub probe_delay_ms: Option<u64>,

    /// Timeout for a single HTTP request to a sidecar, in seconds
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Sidecar settings
        if other.sidecar.python.is_some() {
            self.sidecar.python = other.sidecar.python;
        }
        if other.sidecar.ruby.is_some() {
            self.sidecar.ruby = other.sidecar.ruby;
        }
        if other.sidecar.python_endpoint.is_some() {
            self.sidecar.python_endpoint = other.sidecar.python_endpoint;
        }
        if other.sidecar.ruby_endpoint.is_some() {
            self.sidecar.ruby_endpoint = other.sidecar.ruby_endpoint;
        }
        if other.sidecar.script.is_some() {
            self.sidecar.script = other.sidecar.script;
        }

        // Server settings
        if other.server.ready_timeout_ms.is_some() {
            self.server.ready_timeout_ms = other.server.ready_timeout_ms;
        }
        if other.server.poll_interval_ms.is_some() {
            self.server.poll_interval_ms = other.server.poll_interval_ms;
        }
        if other.server.probe_attempts.is_some() {
            self.server.probe_attempts = other.server.probe_attempts;
        }
        if other.server.probe_delay_ms.is_some() {
            self.server.probe_delay_ms = other.server.probe_delay_ms;
        }
        if other.server.request_timeout_secs.is_some() {
            self.server.request_timeout_secs = other.server.request_timeout_secs;
        }
    }

    /// Resolve server options, filling unset values with defaults.
    pub fn server_options(&self) -> ServerOptions {
        let defaults = ServerOptions::default();
        let server = &self.server;

        ServerOptions {
            ready_timeout: server
                .ready_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.ready_timeout),
            poll_interval: server
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval)
                .max(MIN_POLL_INTERVAL),
            probe_attempts: server.probe_attempts.unwrap_or(defaults.probe_attempts),
            probe_delay: server
                .probe_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.probe_delay),
            request_timeout: server
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

/// Get the global docshim config directory.
pub fn global_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "docshim").map(|d| d.config_dir().to_path_buf())
}

/// Get the global config path.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.docshim/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".docshim").join("config.toml")
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.docshim/config.toml)
/// 2. Global config
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}
