//! Document conversion entry points.
//!
//! [`DocShim`] is the context object callers hold for the lifetime of their
//! program. It owns the [`Registry`] and with it every sidecar; dropping it
//! (or calling [`DocShim::cleanup`]) stops them all.
//!
//! ## Usage
//!
//! ```ignore
//! let shim = DocShim::new(&Config::default());
//!
//! if shim.supports_rst() {
//!     let html = shim.convert_from_rst(b"Title\n=====\n")?;
//! }
//!
//! shim.cleanup();
//! ```

use crate::core::error::Result;
use crate::core::format::Format;
use crate::shim::registry::Registry;
use crate::util::config::Config;

/// Conversion API over a registry of sidecars.
#[derive(Debug)]
pub struct DocShim {
    registry: Registry,
}

impl DocShim {
    /// Create a context with the built-in sidecars.
    ///
    /// Nothing is spawned until a format is first used.
    pub fn new(config: &Config) -> Self {
        DocShim::with_registry(Registry::with_default_backends(config))
    }

    /// Create a context over a custom registry.
    pub fn with_registry(registry: Registry) -> Self {
        DocShim { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Convert `input` from `format`.
    ///
    /// When the sidecar reports a problem the error still carries its output;
    /// see [`ShimError::partial_content`](crate::ShimError::partial_content).
    pub fn convert(&self, format: &Format, input: &[u8]) -> Result<Vec<u8>> {
        let server = self.registry.get_server(format)?;
        server.do_conversion(format, input)
    }

    pub fn convert_from_rst(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.convert(&Format::RST, input)
    }

    pub fn convert_from_asciidoc(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.convert(&Format::ASCIIDOC, input)
    }

    pub fn convert_from_asciidoctor(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.convert(&Format::ASCIIDOCTOR, input)
    }

    /// Whether `format` can be converted right now. May start a sidecar.
    pub fn supports(&self, format: &Format) -> bool {
        self.registry.has_support(format)
    }

    pub fn supports_rst(&self) -> bool {
        self.supports(&Format::RST)
    }

    pub fn supports_asciidoc(&self) -> bool {
        self.supports(&Format::ASCIIDOC)
    }

    pub fn supports_asciidoctor(&self) -> bool {
        self.supports(&Format::ASCIIDOCTOR)
    }

    /// Reset every sidecar, restarting the ones that were running.
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// Stop every sidecar.
    pub fn cleanup(&self) {
        self.registry.cleanup();
    }
}
