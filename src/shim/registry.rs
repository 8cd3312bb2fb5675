//! Format registry - routes each document format to the server that owns it.
//!
//! Key principle: construction never starts anything. Sidecars are spawned
//! lazily the first time a routed format is probed or converted.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::error::{Result, ShimError};
use crate::core::format::Format;
use crate::shim::backend::{backend_for, Backend, BackendId, ScriptBackend};
use crate::shim::server::{ServerOptions, ShimServer};
use crate::util::config::Config;

/// Routing table from [`Format`] to [`ShimServer`].
///
/// Several formats may share one server. Lifecycle fan-out (`cleanup`,
/// `reset`) touches each distinct server exactly once.
#[derive(Debug, Default)]
pub struct Registry {
    servers: RwLock<HashMap<Format, Arc<ShimServer>>>,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with the built-in sidecars.
    ///
    /// The Python sidecar serves rst and asciidoc, the Ruby sidecar serves
    /// asciidoctor. A `[sidecar.script]` section adds a script sidecar for
    /// its listed formats, taking those formats over from the built-ins.
    pub fn with_default_backends(config: &Config) -> Self {
        let options = config.server_options();
        let mut builder = Registry::builder();

        let mut add = |id: BackendId, formats: &[Format]| match backend_for(id, &config.sidecar) {
            Ok(backend) => {
                let server = Arc::new(ShimServer::new(backend, options.clone()));
                for format in formats {
                    builder.route(format.clone(), &server);
                }
            }
            Err(e) => tracing::warn!("skipping {} sidecar: {}", id, e),
        };
        add(BackendId::Python, &[Format::RST, Format::ASCIIDOC]);
        add(BackendId::Ruby, &[Format::ASCIIDOCTOR]);

        if let Some(ref script) = config.sidecar.script {
            let formats: Vec<Format> = script.formats.iter().map(Format::new).collect();
            if formats.is_empty() {
                tracing::warn!(
                    "script sidecar `{}` lists no formats, ignoring it",
                    script.path.display()
                );
            } else {
                builder.serve(Arc::new(ScriptBackend::from_config(script)), &formats, options);
            }
        }

        builder.build()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Format, Arc<ShimServer>>> {
        self.servers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Format, Arc<ShimServer>>> {
        self.servers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Server routed for `format`, verified to support it.
    ///
    /// The probe may start the sidecar. It runs outside the registry lock.
    pub fn get_server(&self, format: &Format) -> Result<Arc<ShimServer>> {
        let server = self
            .read()
            .get(format)
            .cloned()
            .ok_or_else(|| ShimError::NotRegistered(format.clone()))?;

        server
            .supports_conversion(format)
            .map_err(|e| ShimError::UnsupportedFormat {
                format: format.clone(),
                reason: e.to_string(),
            })?;

        Ok(server)
    }

    /// Whether a routed server confirms support for `format`.
    pub fn has_support(&self, format: &Format) -> bool {
        match self.get_server(format) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("{}", e);
                false
            }
        }
    }

    /// Whether `format` is routed at all. Never touches a sidecar.
    pub fn is_registered(&self, format: &Format) -> bool {
        self.read().contains_key(format)
    }

    /// Stop every server.
    pub fn cleanup(&self) {
        let servers = self.write();
        for server in distinct(servers.values()) {
            server.stop();
        }
    }

    /// Reset every server, restarting the ones that were running.
    pub fn reset(&self) {
        let servers = self.write();
        for server in distinct(servers.values()) {
            let was_running = server.is_running();
            server.reset();
            if was_running {
                server.start();
                if let Some(e) = server.get_error() {
                    tracing::warn!("failed to restart `{}`: {}", server.name(), e);
                }
            }
        }
    }

    /// Every distinct server, in format order of first appearance.
    pub fn servers(&self) -> Vec<Arc<ShimServer>> {
        let servers = self.read();
        let mut formats: Vec<_> = servers.keys().collect();
        formats.sort();
        distinct(formats.into_iter().filter_map(|f| servers.get(f)))
    }

    /// Routed formats, sorted.
    pub fn formats(&self) -> Vec<Format> {
        let mut formats: Vec<_> = self.read().keys().cloned().collect();
        formats.sort();
        formats
    }

    /// Formats routed to `server`, sorted.
    pub fn formats_of(&self, server: &Arc<ShimServer>) -> Vec<Format> {
        let mut formats: Vec<_> = self
            .read()
            .iter()
            .filter(|(_, s)| Arc::ptr_eq(s, server))
            .map(|(f, _)| f.clone())
            .collect();
        formats.sort();
        formats
    }
}

fn distinct<'a>(servers: impl Iterator<Item = &'a Arc<ShimServer>>) -> Vec<Arc<ShimServer>> {
    let mut seen: Vec<Arc<ShimServer>> = Vec::new();
    for server in servers {
        if !seen.iter().any(|s| Arc::ptr_eq(s, server)) {
            seen.push(Arc::clone(server));
        }
    }
    seen
}

/// Builder for [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    servers: HashMap<Format, Arc<ShimServer>>,
}

impl RegistryBuilder {
    /// Route `format` to `server`, replacing any previous route.
    pub fn route(&mut self, format: Format, server: &Arc<ShimServer>) -> &mut Self {
        if let Some(previous) = self.servers.insert(format.clone(), Arc::clone(server)) {
            if !Arc::ptr_eq(&previous, server) {
                tracing::debug!(
                    "'{}' rerouted from `{}` to `{}`",
                    format,
                    previous.name(),
                    server.name()
                );
            }
        }
        self
    }

    /// Create one server for `backend` and route all `formats` to it.
    pub fn serve(
        &mut self,
        backend: Arc<dyn Backend>,
        formats: &[Format],
        options: ServerOptions,
    ) -> Arc<ShimServer> {
        let server = Arc::new(ShimServer::new(backend, options));
        for format in formats {
            self.route(format.clone(), &server);
        }
        server
    }

    pub fn build(self) -> Registry {
        Registry {
            servers: RwLock::new(self.servers),
        }
    }
}
