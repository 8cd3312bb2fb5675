//! Sidecar supervision system.
//!
//! Conversion is delegated to external interpreter processes ("sidecars")
//! that speak a tiny HTTP protocol on loopback. This module starts them
//! lazily, routes formats to them, and tears them down again.
//!
//! # Architecture
//!
//! ```text
//!                       ┌─────────────────┐
//!                       │    Registry     │ (format -> server)
//!                       └────────┬────────┘
//!                                │
//!          ┌─────────────────────┼─────────────────────┐
//!          ▼                     ▼                     ▼
//!  ┌───────────────┐    ┌───────────────┐    ┌───────────────┐
//!  │  ShimServer   │    │  ShimServer   │    │  ShimServer   │
//!  │ rst, asciidoc │    │  asciidoctor  │    │   (script)    │
//!  └───────┬───────┘    └───────┬───────┘    └───────┬───────┘
//!          ▼                    ▼                    ▼
//!  ┌───────────────┐    ┌───────────────┐    ┌───────────────┐
//!  │ PythonBackend │    │  RubyBackend  │    │ ScriptBackend │
//!  └───────────────┘    └───────────────┘    └───────────────┘
//! ```
//!
//! # Key Concepts
//!
//! - **Backend** - Stateless description of a sidecar flavor (in `backend.rs`)
//! - **Endpoint** - Where a sidecar listens, allocated or fixed (in `endpoint.rs`)
//! - **ShimServer** - Lifecycle state machine for one sidecar (in `server.rs`)
//! - **SidecarClient** - The HTTP conversion protocol (in `client.rs`)
//! - **Registry** - Format routing and lifecycle fan-out (in `registry.rs`)
//!
//! # Usage
//!
//! ```ignore
//! use docshim::shim::{PythonBackend, Registry, ServerOptions};
//!
//! let mut builder = Registry::builder();
//! builder.serve(
//!     Arc::new(PythonBackend::new()),
//!     &[Format::RST, Format::ASCIIDOC],
//!     ServerOptions::default(),
//! );
//! let registry = builder.build();
//!
//! // Starts the sidecar on first use
//! let server = registry.get_server(&Format::RST)?;
//! let html = server.do_conversion(&Format::RST, b"*hello*")?;
//!
//! registry.cleanup();
//! ```

pub mod backend;
pub mod client;
pub mod endpoint;
pub mod registry;
pub mod server;

pub use backend::{
    backend_for, Backend, BackendId, HealthCheck, PythonBackend, RubyBackend, ScriptBackend,
};
pub use client::SidecarClient;
pub use endpoint::{Endpoint, EndpointSpec};
pub use registry::{Registry, RegistryBuilder};
pub use server::{Phase, ServerOptions, ShimServer};
