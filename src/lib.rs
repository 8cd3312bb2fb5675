//! docshim - supervised sidecar processes for document-format conversion
//!
//! This crate provides the core library functionality for docshim,
//! including sidecar lifecycle management, format routing, and the
//! HTTP conversion protocol.

pub mod core;
pub mod ops;
pub mod shim;
pub mod util;

/// Test utilities and mocks for docshim unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a stub HTTP sidecar and a backend that
/// spawns a real, inert child process.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{error::ErrorLog, error::Result, error::ShimError, format::Format};

pub use ops::DocShim;
pub use shim::{Backend, BackendId, Registry, ServerOptions, ShimServer};
pub use util::config::Config;
